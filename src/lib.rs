//! # LC-3 Virtual Machine
//!
//! A virtual machine for the LC-3 (Little Computer 3), the 16-bit teaching
//! architecture from Patt & Patel's *Introduction to Computing Systems*.
//!
//! Object images are loaded into a flat 64K-word memory, then the machine
//! runs a fetch-decode-execute loop from x3000 until the program executes
//! `HALT` or hits an instruction it cannot run. Keyboard and console I/O go
//! through the [`host::Console`] trait, so the same machine drives a real
//! terminal, a test harness, or a browser page.

pub mod cpu;
pub mod host;
pub mod image;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Machine, MachineError, CpuState, Fault, RunOutcome, Registers, Reg, Flag, Memory, Instruction};
pub use host::{Console, BufferConsole};
pub use image::{Image, LoadError, disassemble};

#[cfg(feature = "term")]
pub use host::TerminalConsole;
