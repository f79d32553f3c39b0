//! Host terminal console built on crossterm.
//!
//! When stdin is a terminal, the console switches it into raw mode (no line
//! buffering, no echo) for as long as the console lives. Raw mode is held by
//! a [`RawModeGuard`] and released in its `Drop`, so the terminal is restored
//! on every way out of the program that unwinds: halt, fault, I/O error,
//! Ctrl-C, or a panic unwinding through `main`.
//!
//! In raw mode the terminal no longer turns Ctrl-C into SIGINT. It arrives as
//! an ordinary key event, which the console reports as
//! [`io::ErrorKind::Interrupted`]. Signals sent from outside (`kill`, a
//! closed terminal) never unwind, so taking raw mode also installs a
//! signal-hook handler that restores the terminal and exits with
//! [`INTERRUPTED_EXIT`].

use super::Console;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::collections::VecDeque;
use std::io::{self, IsTerminal, Read, Stdout, Write};
use std::process;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Exit status after a host interrupt (128 + SIGINT).
pub const INTERRUPTED_EXIT: i32 = 130;

/// Signals that would end the process with the terminal still raw.
pub const RESTORE_SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGHUP];

/// Install the terminal-restoring signal handler.
///
/// The handler runs on its own thread: on the first of [`RESTORE_SIGNALS`]
/// it leaves raw mode and exits the process with [`INTERRUPTED_EXIT`].
/// Installing more than once is a no-op.
pub fn install_signal_restore() -> io::Result<()> {
    static INSTALLED: Mutex<bool> = Mutex::new(false);

    let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
    if *installed {
        return Ok(());
    }

    let mut signals = Signals::new(RESTORE_SIGNALS)?;
    thread::Builder::new()
        .name("signal-restore".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                let _ = terminal::disable_raw_mode();
                log::info!("received signal {}, terminal restored", signal);
                process::exit(INTERRUPTED_EXIT);
            }
        })?;

    *installed = true;
    Ok(())
}

/// Keeps the host terminal in raw mode until dropped.
#[derive(Debug)]
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    /// Enable raw mode, with the signal handler in place first.
    pub fn acquire() -> io::Result<Self> {
        if let Err(e) = install_signal_restore() {
            log::warn!("no signal handler, a kill may leave the terminal raw: {}", e);
        }
        terminal::enable_raw_mode()?;
        log::debug!("terminal switched to raw mode");
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            log::warn!("failed to restore terminal mode: {}", e);
        } else {
            log::debug!("terminal mode restored");
        }
    }
}

/// Non-terminal input drained by a reader thread, so polling never blocks.
struct PipedInput {
    rx: Receiver<io::Result<u8>>,
}

impl PipedInput {
    fn spawn<R: Read + Send + 'static>(reader: R) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                for byte in reader.bytes() {
                    let failed = byte.is_err();
                    if tx.send(byte).is_err() || failed {
                        break;
                    }
                }
            })?;
        Ok(Self { rx })
    }

    /// The next byte, if one has already arrived.
    fn try_next(&self) -> io::Result<Option<u8>> {
        match self.rx.try_recv() {
            Ok(byte) => byte.map(Some),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
        }
    }

    /// Wait for the next byte. `None` at end of input.
    fn next(&self) -> io::Result<Option<u8>> {
        match self.rx.recv() {
            Ok(byte) => byte.map(Some),
            Err(_) => Ok(None),
        }
    }
}

/// Console attached to the process's stdin/stdout.
pub struct TerminalConsole {
    /// `Some` while stdin is an interactive terminal in raw mode.
    raw: Option<RawModeGuard>,
    /// `Some` when stdin is a pipe or file.
    piped: Option<PipedInput>,
    /// Characters seen by `key_ready` but not yet read by the guest.
    pending: VecDeque<u8>,
    stdout: Stdout,
}

impl TerminalConsole {
    /// Attach to stdin/stdout, entering raw mode if stdin is a terminal.
    pub fn new() -> io::Result<Self> {
        let stdin = io::stdin();
        let (raw, piped) = if stdin.is_terminal() {
            (Some(RawModeGuard::acquire()?), None)
        } else {
            log::debug!("stdin is not a terminal; reading raw bytes");
            (None, Some(PipedInput::spawn(stdin)?))
        };

        Ok(Self {
            raw,
            piped,
            pending: VecDeque::new(),
            stdout: io::stdout(),
        })
    }

    /// Whether input comes from an interactive terminal.
    pub fn is_interactive(&self) -> bool {
        self.raw.is_some()
    }

    /// Restore the terminal now rather than at drop.
    pub fn restore(&mut self) {
        self.raw = None;
    }

    /// Pull the next event off the terminal queue and translate it.
    fn next_key(&mut self) -> io::Result<Option<u8>> {
        match event::read()? {
            Event::Key(key) => translate_key(key),
            _ => Ok(None),
        }
    }
}

impl Console for TerminalConsole {
    fn key_ready(&mut self) -> io::Result<bool> {
        if !self.pending.is_empty() {
            return Ok(true);
        }

        if let Some(piped) = &self.piped {
            return match piped.try_next()? {
                Some(byte) => {
                    self.pending.push_back(byte);
                    Ok(true)
                }
                None => Ok(false),
            };
        }

        while event::poll(Duration::ZERO)? {
            if let Some(byte) = self.next_key()? {
                self.pending.push_back(byte);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn read_char(&mut self) -> io::Result<u8> {
        if let Some(byte) = self.pending.pop_front() {
            return Ok(byte);
        }

        if let Some(piped) = &self.piped {
            return piped
                .next()?
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "end of input"));
        }

        loop {
            if let Some(byte) = self.next_key()? {
                return Ok(byte);
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.is_interactive() {
            return self.stdout.write_all(bytes);
        }

        // Raw mode disables output post-processing, so newlines need a
        // carriage return to return to column 0.
        let mut out = self.stdout.lock();
        for chunk in bytes.split_inclusive(|&b| b == b'\n') {
            match chunk.split_last() {
                Some((b'\n', head)) => {
                    out.write_all(head)?;
                    out.write_all(b"\r\n")?;
                }
                _ => out.write_all(chunk)?,
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

/// Map a key press to the byte an LC-3 program expects.
fn translate_key(key: KeyEvent) -> io::Result<Option<u8>> {
    if key.kind != KeyEventKind::Press {
        return Ok(None);
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let byte = match key.code {
        KeyCode::Char('c') | KeyCode::Char('C') if ctrl => {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted by Ctrl-C"));
        }
        KeyCode::Char(c) if ctrl && c.is_ascii_alphabetic() => (c.to_ascii_lowercase() as u8) & 0x1F,
        KeyCode::Char(c) if c.is_ascii() => c as u8,
        KeyCode::Enter => b'\n',
        KeyCode::Tab => b'\t',
        KeyCode::Backspace => 0x08,
        KeyCode::Esc => 0x1B,
        _ => return Ok(None),
    };

    Ok(Some(byte))
}
