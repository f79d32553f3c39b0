//! Host I/O bridge.
//!
//! The machine never talks to stdin/stdout directly. Every character that
//! crosses the guest/host boundary goes through a [`Console`]:
//! - the keyboard status register polls [`Console::key_ready`]
//! - the GETC/IN traps block on [`Console::read_char`]
//! - the OUT/PUTS/PUTSP/HALT traps write with [`Console::write_bytes`]

mod buffer;
#[cfg(feature = "term")]
mod terminal;

pub use buffer::BufferConsole;
#[cfg(feature = "term")]
pub use terminal::{
    install_signal_restore, RawModeGuard, TerminalConsole, INTERRUPTED_EXIT, RESTORE_SIGNALS,
};

use std::io;

/// Character I/O used by the machine.
///
/// Implementations report a host interrupt (Ctrl-C) as an error of kind
/// [`io::ErrorKind::Interrupted`]; the machine turns it into
/// [`MachineError::Interrupted`](crate::cpu::MachineError::Interrupted).
pub trait Console {
    /// Non-blocking check for a pending character.
    ///
    /// Must not consume the character: a following [`read_char`](Self::read_char)
    /// returns it.
    fn key_ready(&mut self) -> io::Result<bool>;

    /// Read one character, blocking until one is available. No echo.
    fn read_char(&mut self) -> io::Result<u8>;

    /// Write raw bytes to the host output.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush buffered output.
    fn flush(&mut self) -> io::Result<()>;
}

impl<C: Console + ?Sized> Console for &mut C {
    fn key_ready(&mut self) -> io::Result<bool> {
        (**self).key_ready()
    }

    fn read_char(&mut self) -> io::Result<u8> {
        (**self).read_char()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_bytes(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<C: Console + ?Sized> Console for Box<C> {
    fn key_ready(&mut self) -> io::Result<bool> {
        (**self).key_ready()
    }

    fn read_char(&mut self) -> io::Result<u8> {
        (**self).read_char()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_bytes(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}
