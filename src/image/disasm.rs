//! Disassembler for LC-3 programs.
//!
//! Converts instruction words back to readable assembly.

use crate::cpu::decode::{decode, Instruction, Operand};
use crate::cpu::trap::TrapVector;
use crate::image::Image;
use std::fmt;

/// Disassemble a single word to text.
///
/// Words that are not instructions are shown as `.FILL` data.
pub fn disassemble_word(word: u16) -> String {
    match decode(word) {
        Ok(instr) => instr.to_string(),
        Err(_) => format!(".FILL x{:04X}", word),
    }
}

/// Disassemble a whole image into an address-annotated listing.
pub fn disassemble(image: &Image) -> String {
    let mut output = String::new();
    output.push_str("; LC-3 Disassembly\n");
    output.push_str("; ----------------\n\n");
    output.push_str(&format!(".ORIG x{:04X}\n", image.origin));

    for (i, word) in image.words.iter().enumerate() {
        let addr = image.origin.wrapping_add(i as u16);
        let line = disassemble_word(*word);
        output.push_str(&format!("x{:04X}: {:04X}  {}\n", addr, word, line));
    }

    output.push_str(".END\n");
    output
}

/// Format a sign-extended offset as a signed decimal immediate.
fn imm(value: u16) -> String {
    format!("#{}", value as i16)
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let src = |operand: &Operand| match operand {
            Operand::Reg(reg) => reg.to_string(),
            Operand::Imm(value) => imm(*value),
        };

        match self {
            // Operate
            Instruction::Add { dr, sr1, src: s } => write!(f, "ADD {}, {}, {}", dr, sr1, src(s)),
            Instruction::And { dr, sr1, src: s } => write!(f, "AND {}, {}, {}", dr, sr1, src(s)),
            Instruction::Not { dr, sr } => write!(f, "NOT {}, {}", dr, sr),

            // Control
            Instruction::Br { nzp, offset } => {
                if *nzp == 0 {
                    return write!(f, "NOP");
                }
                let mut mnemonic = String::from("BR");
                if nzp & 0b100 != 0 {
                    mnemonic.push('n');
                }
                if nzp & 0b010 != 0 {
                    mnemonic.push('z');
                }
                if nzp & 0b001 != 0 {
                    mnemonic.push('p');
                }
                write!(f, "{} {}", mnemonic, imm(*offset))
            }
            Instruction::Jmp { base } if base.index() == 7 => write!(f, "RET"),
            Instruction::Jmp { base } => write!(f, "JMP {}", base),
            Instruction::Jsr { offset } => write!(f, "JSR {}", imm(*offset)),
            Instruction::Jsrr { base } => write!(f, "JSRR {}", base),
            Instruction::Trap { vector } => match TrapVector::from_u8(*vector) {
                Some(trap) => write!(f, "{}", trap.name()),
                None => write!(f, "TRAP x{:02X}", vector),
            },

            // Data movement
            Instruction::Ld { dr, offset } => write!(f, "LD {}, {}", dr, imm(*offset)),
            Instruction::Ldi { dr, offset } => write!(f, "LDI {}, {}", dr, imm(*offset)),
            Instruction::Ldr { dr, base, offset } => write!(f, "LDR {}, {}, {}", dr, base, imm(*offset)),
            Instruction::Lea { dr, offset } => write!(f, "LEA {}, {}", dr, imm(*offset)),
            Instruction::St { sr, offset } => write!(f, "ST {}, {}", sr, imm(*offset)),
            Instruction::Sti { sr, offset } => write!(f, "STI {}, {}", sr, imm(*offset)),
            Instruction::Str { sr, base, offset } => write!(f, "STR {}, {}, {}", sr, base, imm(*offset)),
        }
    }
}
