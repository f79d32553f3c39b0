//! LC-3 register file.
//!
//! The LC-3 has 10 architectural registers visible to user programs:
//! - R0-R7: 16-bit general purpose registers (R7 doubles as the link register)
//! - PC: address of the next instruction to fetch
//! - COND: the condition code, exactly one of N, Z or P

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 8;

/// A general purpose register index (0-7).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reg(u8);

impl Reg {
    pub const R0: Reg = Reg(0);
    pub const R1: Reg = Reg(1);
    pub const R2: Reg = Reg(2);
    pub const R3: Reg = Reg(3);
    pub const R4: Reg = Reg(4);
    pub const R5: Reg = Reg(5);
    pub const R6: Reg = Reg(6);
    pub const R7: Reg = Reg(7);

    /// Create a register index from the low 3 bits of `index`.
    #[inline]
    pub const fn new(index: u16) -> Self {
        Reg((index & 0b111) as u8)
    }

    /// The register number as an array index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Condition code.
///
/// The discriminants match the `n`, `z` and `p` bits (11, 10, 9) of a BR
/// instruction once shifted down, so a branch is taken when
/// `cond_mask & flag.bits() != 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Flag {
    /// Last result was positive (P).
    Positive = 0b001,
    /// Last result was zero (Z).
    Zero = 0b010,
    /// Last result was negative (N).
    Negative = 0b100,
}

impl Flag {
    /// Classify a 16-bit value read as two's complement.
    #[inline]
    pub const fn from_value(value: u16) -> Self {
        if value == 0 {
            Flag::Zero
        } else if value & 0x8000 != 0 {
            Flag::Negative
        } else {
            Flag::Positive
        }
    }

    /// Raw flag bits.
    #[inline]
    pub const fn bits(self) -> u16 {
        self as u16
    }

    /// Single-letter mnemonic used in listings.
    pub const fn letter(self) -> char {
        match self {
            Flag::Positive => 'P',
            Flag::Zero => 'Z',
            Flag::Negative => 'N',
        }
    }
}

/// The LC-3 register file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7
    gpr: [u16; REGISTER_COUNT],

    /// Program counter: address of the next instruction to fetch.
    pub pc: u16,

    /// Condition code set by the last register-defining instruction.
    pub cond: Flag,
}

impl Registers {
    /// Create a register file with all registers zeroed and COND = Z.
    pub fn new() -> Self {
        Self {
            gpr: [0; REGISTER_COUNT],
            pc: 0,
            cond: Flag::Zero,
        }
    }

    /// Reset all registers to their power-on values.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read a general purpose register.
    #[inline]
    pub fn get(&self, reg: Reg) -> u16 {
        self.gpr[reg.index()]
    }

    /// Write a general purpose register. Does not touch COND.
    #[inline]
    pub fn set(&mut self, reg: Reg, value: u16) {
        self.gpr[reg.index()] = value;
    }

    /// Set COND from the value currently held in `reg`.
    ///
    /// Call only after the destination register has been written.
    #[inline]
    pub fn update_flags(&mut self, reg: Reg) {
        self.cond = Flag::from_value(self.get(reg));
    }

    /// Write `value` to `reg` and then update COND from it.
    #[inline]
    pub fn define(&mut self, reg: Reg, value: u16) {
        self.set(reg, value);
        self.update_flags(reg);
    }

    /// Increment the program counter by 1, wrapping at 0xFFFF.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u16) {
        self.pc = addr;
    }

    /// PC plus a sign-extended offset, wrapping modulo 2^16.
    #[inline]
    pub fn pc_relative(&self, offset: u16) -> u16 {
        self.pc.wrapping_add(offset)
    }

    /// All general purpose registers, R0 first.
    pub fn general(&self) -> &[u16; REGISTER_COUNT] {
        &self.gpr
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.gpr.iter().enumerate() {
            write!(f, "R{}=x{:04X} ", i, value)?;
        }
        write!(f, "PC=x{:04X} COND={}", self.pc, self.cond.letter())
    }
}
