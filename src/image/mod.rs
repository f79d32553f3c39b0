//! Program images: loading and disassembly.
//!
//! This module provides:
//! - A loader for LC-3 object images (big-endian origin word + payload)
//! - A disassembler (image → readable listing)

pub mod loader;
pub mod disasm;

pub use loader::{Image, LoadError};
pub use disasm::{disassemble, disassemble_word};
