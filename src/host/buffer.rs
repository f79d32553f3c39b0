//! In-memory console with scripted input and captured output.

use super::Console;
use std::collections::VecDeque;
use std::io;

/// A console backed by byte buffers.
///
/// Input is consumed front to back. Once it runs dry, [`Console::key_ready`]
/// reports no key and [`Console::read_char`] fails with
/// [`io::ErrorKind::UnexpectedEof`] instead of blocking forever.
#[derive(Debug, Clone, Default)]
pub struct BufferConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
    flushes: usize,
}

impl BufferConsole {
    /// Create a console with no pending input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a console whose input is `input`.
    pub fn with_input(input: impl AsRef<[u8]>) -> Self {
        let mut console = Self::new();
        console.push_input(input);
        console
    }

    /// Queue more input bytes.
    pub fn push_input(&mut self, input: impl AsRef<[u8]>) {
        self.input.extend(input.as_ref());
    }

    /// Number of input bytes not yet read.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Output decoded lossily as UTF-8.
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Drain and return captured output.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// How many times output was flushed.
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl Console for BufferConsole {
    fn key_ready(&mut self) -> io::Result<bool> {
        Ok(!self.input.is_empty())
    }

    fn read_char(&mut self) -> io::Result<u8> {
        self.input
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "console input exhausted"))
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
