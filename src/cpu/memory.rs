//! LC-3 memory subsystem.
//!
//! The LC-3 addresses 65,536 sixteen-bit cells. Any `u16` is a valid
//! address, so there is no out-of-range case. Two cells in the device page
//! are memory-mapped keyboard registers:
//! - `KBSR` (0xFE00): bit 15 set when a key is waiting
//! - `KBDR` (0xFE02): the character that was waiting

use crate::host::Console;
use std::io;

/// The number of memory cells in the LC-3.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Keyboard status register.
pub const KBSR: u16 = 0xFE00;

/// Keyboard data register.
pub const KBDR: u16 = 0xFE02;

/// Value of KBSR when a key is waiting.
pub const KEY_READY: u16 = 1 << 15;

/// LC-3 memory: 65,536 sixteen-bit cells.
#[derive(Clone)]
pub struct Memory {
    cells: Box<[u16]>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    /// Read a cell the way the CPU does.
    ///
    /// Reading `KBSR` polls the console first. If a key is waiting, KBSR
    /// becomes `1 << 15` and the character is stored in KBDR before the read
    /// returns; otherwise KBSR becomes 0 and KBDR is left alone.
    pub fn read<C: Console + ?Sized>(&mut self, addr: u16, console: &mut C) -> io::Result<u16> {
        if addr == KBSR {
            if console.key_ready()? {
                let ch = console.read_char()?;
                self.cells[KBSR as usize] = KEY_READY;
                self.cells[KBDR as usize] = u16::from(ch);
            } else {
                self.cells[KBSR as usize] = 0;
            }
        }
        Ok(self.cells[addr as usize])
    }

    /// Read a cell without any device side effect.
    #[inline]
    pub fn peek(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    /// Write a cell. Device registers behave as plain storage on write.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        self.cells[addr as usize] = value;
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Copy `words` into memory starting at `origin`.
    ///
    /// Words that would land past 0xFFFF are dropped. Returns how many
    /// words were written.
    pub fn load(&mut self, origin: u16, words: &[u16]) -> usize {
        let start = origin as usize;
        let count = words.len().min(MEMORY_SIZE - start);
        self.cells[start..start + count].copy_from_slice(&words[..count]);
        count
    }

    /// Cells `start..start + count`, clamped to the end of memory.
    pub fn slice(&self, start: u16, count: usize) -> &[u16] {
        let start = start as usize;
        let end = (start + count).min(MEMORY_SIZE);
        &self.cells[start..end]
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}
