//! Trap service routines.
//!
//! The LC-3 OS provides its I/O routines through `TRAP` vectors. They are
//! implemented here on the host side, each doing exactly one console
//! interaction before control returns to the fetch loop.

use crate::cpu::execute::{Fault, Machine, MachineError};
use crate::cpu::memory::MEMORY_SIZE;
use crate::cpu::registers::Reg;
use crate::host::Console;
use serde::{Deserialize, Serialize};

/// Prompt printed by the IN trap.
pub const IN_PROMPT: &str = "Enter a character: ";

/// Notice printed by the HALT trap.
pub const HALT_NOTICE: &str = "HALT\n";

/// Known trap vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TrapVector {
    /// Read a character, no echo.
    Getc = 0x20,
    /// Write the character in R0.
    Out = 0x21,
    /// Write the string of one-character words at R0.
    Puts = 0x22,
    /// Prompt, read a character, and echo it.
    In = 0x23,
    /// Write the string of two-character words at R0.
    Putsp = 0x24,
    /// Stop the machine.
    Halt = 0x25,
}

impl TrapVector {
    /// Look up a vector number.
    pub const fn from_u8(vector: u8) -> Option<Self> {
        match vector {
            0x20 => Some(TrapVector::Getc),
            0x21 => Some(TrapVector::Out),
            0x22 => Some(TrapVector::Puts),
            0x23 => Some(TrapVector::In),
            0x24 => Some(TrapVector::Putsp),
            0x25 => Some(TrapVector::Halt),
            _ => None,
        }
    }

    /// Assembler alias for the trap.
    pub const fn name(self) -> &'static str {
        match self {
            TrapVector::Getc => "GETC",
            TrapVector::Out => "OUT",
            TrapVector::Puts => "PUTS",
            TrapVector::In => "IN",
            TrapVector::Putsp => "PUTSP",
            TrapVector::Halt => "HALT",
        }
    }
}

impl<C: Console> Machine<C> {
    /// Run the service routine for `vector`.
    ///
    /// R7 already holds the return address. Returns a fault for vectors the
    /// architecture does not define.
    pub(crate) fn trap(&mut self, vector: u8) -> Result<Option<Fault>, MachineError> {
        let Some(trap) = TrapVector::from_u8(vector) else {
            return Ok(Some(Fault::UnknownTrap(vector)));
        };

        match trap {
            TrapVector::Getc => {
                let ch = self.console.read_char()?;
                self.regs.define(Reg::R0, u16::from(ch));
            }

            TrapVector::Out => {
                let ch = (self.regs.get(Reg::R0) & 0xFF) as u8;
                self.console.write_bytes(&[ch])?;
                self.console.flush()?;
            }

            TrapVector::Puts => {
                let text = self.collect_string(|word, out| {
                    out.push((word & 0xFF) as u8);
                });
                self.console.write_bytes(&text)?;
                self.console.flush()?;
            }

            TrapVector::In => {
                self.console.write_bytes(IN_PROMPT.as_bytes())?;
                self.console.flush()?;
                let ch = self.console.read_char()?;
                self.console.write_bytes(&[ch])?;
                self.console.flush()?;
                self.regs.define(Reg::R0, u16::from(ch));
            }

            TrapVector::Putsp => {
                let text = self.collect_string(|word, out| {
                    out.push((word & 0xFF) as u8);
                    let high = (word >> 8) as u8;
                    if high != 0 {
                        out.push(high);
                    }
                });
                self.console.write_bytes(&text)?;
                self.console.flush()?;
            }

            TrapVector::Halt => {
                self.console.write_bytes(HALT_NOTICE.as_bytes())?;
                self.console.flush()?;
                self.halt();
            }
        }

        Ok(None)
    }

    /// Walk words from the address in R0 up to a zero word, unpacking each
    /// with `unpack`. Reads are plain storage reads with no device effects.
    fn collect_string(&self, unpack: impl Fn(u16, &mut Vec<u8>)) -> Vec<u8> {
        let mut out = Vec::new();
        let mut addr = self.regs.get(Reg::R0);

        // A string can't be longer than memory itself
        for _ in 0..MEMORY_SIZE {
            let word = self.mem.peek(addr);
            if word == 0 {
                break;
            }
            unpack(word, &mut out);
            addr = addr.wrapping_add(1);
        }

        out
    }
}
