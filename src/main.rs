//! LC-3 VM - CLI Entry Point
//!
//! Commands:
//! - `lc3-vm run <image>...` - Load object images and run from x3000
//! - `lc3-vm disasm <image>` - Disassemble an object image

use clap::{Parser, Subcommand};
use lc3::{Image, Machine, MachineError, Registers, RunOutcome, TerminalConsole};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Process exit codes.
mod exit {
    pub const HALTED: i32 = 0;
    pub const LOAD_FAILED: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const FAULT: i32 = 3;
    pub const HOST_ERROR: i32 = 4;
    pub const INTERRUPTED: i32 = lc3::host::INTERRUPTED_EXIT;
}

#[derive(Parser)]
#[command(name = "lc3-vm")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "A virtual machine for the LC-3 educational computer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load one or more object images and run until HALT
    Run {
        /// Object images, loaded in order (later images may overwrite earlier ones)
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Stop after this many instructions
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Write the final registers as JSON to this file
        #[arg(long, value_name = "PATH")]
        dump_registers: Option<PathBuf>,
    },
    /// Disassemble an object image
    Disasm {
        /// Path to the object image
        image: PathBuf,
    },
}

/// Final machine state written by `--dump-registers`.
#[derive(Serialize)]
struct RunReport<'a> {
    outcome: Option<RunOutcome>,
    cycles: u64,
    registers: &'a Registers,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let code = match cli.command {
        Some(Commands::Run { images, max_cycles, dump_registers }) => {
            run_images(&images, max_cycles, dump_registers.as_deref())
        }
        Some(Commands::Disasm { image }) => disassemble_file(&image),
        None => {
            eprintln!("LC-3 VM v0.1.0");
            eprintln!("usage: lc3-vm run <image>...");
            eprintln!();
            eprintln!("Use --help for available commands");
            exit::USAGE
        }
    };

    // Every console (and its raw mode guard) is dropped by now
    std::process::exit(code);
}

fn run_images(paths: &[PathBuf], max_cycles: Option<u64>, dump: Option<&Path>) -> i32 {
    // Parse every image before touching the terminal
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        match Image::open(path) {
            Ok(image) => images.push(image),
            Err(e) => {
                eprintln!("failed to load image {}: {}", path.display(), e);
                return exit::LOAD_FAILED;
            }
        }
    }

    let console = match TerminalConsole::new() {
        Ok(console) => console,
        Err(e) => {
            eprintln!("failed to set up terminal: {}", e);
            return exit::HOST_ERROR;
        }
    };

    let mut machine = Machine::new(console);
    for (path, image) in paths.iter().zip(&images) {
        if image.is_empty() {
            log::warn!("{} holds an origin but no words", path.display());
        }
        log::debug!("installing {} ({} words)", path.display(), image.len());
        image.install(&mut machine.mem);
    }

    let result = match max_cycles {
        Some(limit) => machine.run_limited(limit),
        None => machine.run().map(Some),
    };

    // Leave raw mode before reporting anything
    machine.console_mut().restore();

    let code = match &result {
        Ok(Some(RunOutcome::Halted)) => exit::HALTED,
        Ok(Some(RunOutcome::FatalOpcode { fault, pc })) => {
            eprintln!("fatal: {} at x{:04X}", fault, pc);
            exit::FAULT
        }
        Ok(None) => {
            eprintln!("stopped after {} instructions without halting", machine.cycles);
            exit::HOST_ERROR
        }
        Err(MachineError::Interrupted) => {
            eprintln!();
            eprintln!("interrupted");
            exit::INTERRUPTED
        }
        Err(e) => {
            eprintln!("error at x{:04X}: {}", machine.regs.pc, e);
            exit::HOST_ERROR
        }
    };

    if let Some(path) = dump {
        let report = RunReport {
            outcome: result.ok().flatten(),
            cycles: machine.cycles,
            registers: &machine.regs,
        };
        if let Err(e) = write_report(path, &report) {
            eprintln!("failed to write {}: {}", path.display(), e);
        }
    }

    code
}

fn write_report(path: &Path, report: &RunReport<'_>) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json + "\n")
}

fn disassemble_file(path: &Path) -> i32 {
    match Image::open(path) {
        Ok(image) => {
            print!("{}", lc3::disassemble(&image));
            exit::HALTED
        }
        Err(e) => {
            eprintln!("failed to load image {}: {}", path.display(), e);
            exit::LOAD_FAILED
        }
    }
}
