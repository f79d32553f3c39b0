//! WebAssembly bindings for the LC-3 virtual machine.
//!
//! This module provides JavaScript-friendly wrappers around the core machine.
//! The browser has no terminal, so the machine runs against a
//! [`BufferConsole`]: JavaScript queues keystrokes with `push_input` and
//! collects program output with `take_output`.

use wasm_bindgen::prelude::*;
use crate::{BufferConsole, CpuState, Image, Machine, Reg};
use crate::image::disassemble_word;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmMachine {
    machine: Machine<BufferConsole>,
    images: Vec<Image>,
}

#[wasm_bindgen]
impl WasmMachine {
    /// Create a new machine instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            machine: Machine::new(BufferConsole::new()),
            images: Vec::new(),
        }
    }

    /// Load an object image. Returns the number of words placed in memory.
    #[wasm_bindgen]
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<usize, JsError> {
        let image = Image::from_bytes(bytes)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        let written = image.install(&mut self.machine.mem);
        self.images.push(image);
        Ok(written)
    }

    /// Queue keyboard input for GETC, IN, and the keyboard registers.
    #[wasm_bindgen]
    pub fn push_input(&mut self, text: &str) {
        self.machine.console_mut().push_input(text);
    }

    /// Drain program output produced so far.
    #[wasm_bindgen]
    pub fn take_output(&mut self) -> String {
        let bytes = self.machine.console_mut().take_output();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Start from x3000 and run for at most `max_cycles` instructions.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<String, JsError> {
        self.machine.run_limited(u64::from(max_cycles))
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        Ok(self.state())
    }

    /// Continue from the current PC for at most `max_cycles` instructions.
    ///
    /// Lets the page feed more input after a GETC ran out of it: the
    /// starved GETC did not retire and runs again here.
    #[wasm_bindgen]
    pub fn resume(&mut self, max_cycles: u32) -> Result<String, JsError> {
        for _ in 0..max_cycles {
            let state = self.machine.step()
                .map_err(|e| JsError::new(&format!("{}", e)))?;
            if state != CpuState::Running {
                break;
            }
        }
        Ok(self.state())
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        if !self.machine.is_running() {
            return Err(JsError::new("machine is stopped"));
        }

        let word = self.machine.mem.peek(self.machine.regs.pc);
        self.machine.step()
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        Ok(disassemble_word(word))
    }

    /// Reset the machine and reload every image loaded so far.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.machine.reset();
        for image in &self.images {
            image.install(&mut self.machine.mem);
        }
    }

    /// Check if the machine is halted.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.machine.is_halted()
    }

    /// Get cycle count.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.machine.cycles
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.machine.regs.pc
    }

    /// Get a general purpose register (0-7).
    #[wasm_bindgen]
    pub fn register(&self, index: u16) -> u16 {
        self.machine.regs.get(Reg::new(index))
    }

    /// Get the condition code as "N", "Z" or "P".
    #[wasm_bindgen]
    pub fn cond(&self) -> String {
        self.machine.regs.cond.letter().to_string()
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.machine.state())
    }

    /// Get memory cell value at address, without device side effects.
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: u16) -> u16 {
        self.machine.mem.peek(addr)
    }

    /// Get a window of memory.
    #[wasm_bindgen]
    pub fn memory_range(&self, start: u16, count: usize) -> Vec<u16> {
        self.machine.mem.slice(start, count).to_vec()
    }

    /// Get registers as JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.machine.regs)
            .map_err(|e| JsError::new(&format!("{}", e)))
    }
}

impl Default for WasmMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Disassemble a single instruction word.
#[wasm_bindgen]
pub fn wasm_disassemble(word: u16) -> String {
    disassemble_word(word)
}
