//! CPU emulation for the LC-3.
//!
//! This module implements the complete LC-3 user-mode architecture:
//! - 65,536 sixteen-bit memory cells with memory-mapped keyboard registers
//! - 8 general purpose registers, PC, and a one-of-three condition code
//! - 15 usable opcodes plus trap routines for character I/O

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;
pub mod trap;

pub use memory::Memory;
pub use registers::{Flag, Reg, Registers};
pub use decode::{Instruction, Opcode, Operand, DecodeError};
pub use execute::{Machine, MachineError, CpuState, Fault, RunOutcome, PC_START};
pub use trap::TrapVector;
