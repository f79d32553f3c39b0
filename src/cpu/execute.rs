//! CPU execution engine for the LC-3.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::cpu::decode::{self, DecodeError, Instruction, Opcode, Operand};
use crate::cpu::memory::Memory;
use crate::cpu::registers::{Flag, Reg, Registers};
use crate::host::Console;
use crate::image::{Image, LoadError};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use thiserror::Error;

/// Address where user programs start executing.
pub const PC_START: u16 = 0x3000;

/// A guest-program integrity error. There is no recovery from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Fault {
    #[error("illegal opcode {}", .0.mnemonic())]
    IllegalOpcode(Opcode),

    #[error("unknown trap vector x{0:02X}")]
    UnknownTrap(u8),
}

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed TRAP x25).
    Halted,
    /// CPU stopped on a fault raised by the instruction at `pc`.
    Faulted { fault: Fault, pc: u16 },
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The program executed HALT.
    Halted,
    /// The instruction at `pc` was illegal or called an unknown trap.
    FatalOpcode { fault: Fault, pc: u16 },
}

/// Host-side failures while executing.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("host I/O error: {0}")]
    Io(io::Error),

    #[error("interrupted by host")]
    Interrupted,
}

impl From<io::Error> for MachineError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::Interrupted {
            MachineError::Interrupted
        } else {
            MachineError::Io(err)
        }
    }
}

/// The LC-3 machine: registers, memory, and the console they talk to.
pub struct Machine<C> {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Host I/O.
    pub(crate) console: C,
    /// Current execution state.
    state: CpuState,
    /// Instruction count (for profiling).
    pub cycles: u64,
}

impl<C: Console> Machine<C> {
    /// Create a machine with zeroed memory and registers.
    pub fn new(console: C) -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            console,
            state: CpuState::Running,
            cycles: 0,
        }
    }

    /// Reset registers, memory, and state. The console is kept.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
    }

    /// Read an image from `reader` and install it at its origin.
    ///
    /// May be called repeatedly; later images overwrite earlier ones where
    /// they overlap. Returns the number of words placed in memory.
    pub fn load_image<R: Read>(&mut self, reader: R) -> Result<usize, LoadError> {
        let image = Image::read_from(reader)?;
        Ok(image.install(&mut self.mem))
    }

    /// Install an image held in memory.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<usize, LoadError> {
        let image = Image::from_bytes(bytes)?;
        Ok(image.install(&mut self.mem))
    }

    /// Point the PC at [`PC_START`], set COND to Z, and mark the CPU running.
    pub fn start(&mut self) {
        self.regs.pc = PC_START;
        self.regs.cond = Flag::Zero;
        self.state = CpuState::Running;
    }

    /// Start at [`PC_START`] and run until halt or fault.
    ///
    /// Blocks whenever the guest waits on GETC or IN.
    pub fn run(&mut self) -> Result<RunOutcome, MachineError> {
        self.start();
        self.resume()
    }

    /// Continue from the current PC until halt or fault.
    pub fn resume(&mut self) -> Result<RunOutcome, MachineError> {
        loop {
            if let Some(outcome) = Self::outcome_of(self.step()?) {
                return Ok(outcome);
            }
        }
    }

    /// Start at [`PC_START`] and run for at most `max_cycles` instructions.
    ///
    /// Returns `None` if the program was still running when the limit hit.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<Option<RunOutcome>, MachineError> {
        self.start();
        let limit = self.cycles.saturating_add(max_cycles);

        while self.cycles < limit {
            if let Some(outcome) = Self::outcome_of(self.step()?) {
                return Ok(Some(outcome));
            }
        }

        Ok(None)
    }

    fn outcome_of(state: CpuState) -> Option<RunOutcome> {
        match state {
            CpuState::Running => None,
            CpuState::Halted => Some(RunOutcome::Halted),
            CpuState::Faulted { fault, pc } => Some(RunOutcome::FatalOpcode { fault, pc }),
        }
    }

    /// Execute a single instruction.
    ///
    /// Returns the state after the instruction. A stopped CPU stays stopped
    /// and fetches nothing.
    ///
    /// An instruction that fails on host I/O does not retire: registers and
    /// the cycle count are put back, so the next step runs it again. Memory
    /// is never written before a fallible read, so it needs no rollback.
    pub fn step(&mut self) -> Result<CpuState, MachineError> {
        if self.state != CpuState::Running {
            return Ok(self.state);
        }

        // Fetch
        let pc = self.regs.pc;
        let word = self.mem_read(pc)?;
        let saved = self.regs.clone();

        // Advance PC before execute; offsets are relative to the new PC
        self.regs.advance_pc();
        self.cycles += 1;

        // Decode
        let instr = match decode::decode(word) {
            Ok(instr) => instr,
            Err(DecodeError::IllegalOpcode(op)) => {
                return Ok(self.fault(Fault::IllegalOpcode(op), pc));
            }
        };
        log::trace!("x{:04X}: {:<24} {:?}", pc, instr.to_string(), self.regs);

        // Execute
        if let Err(e) = self.execute(instr, pc) {
            log::debug!("x{:04X}: {} did not retire: {}", pc, instr, e);
            self.regs = saved;
            self.cycles -= 1;
            return Err(e);
        }

        Ok(self.state)
    }

    /// Execute a decoded instruction fetched from `pc`.
    fn execute(&mut self, instr: Instruction, pc: u16) -> Result<(), MachineError> {
        match instr {
            // ==================== Operate ====================

            Instruction::Add { dr, sr1, src } => {
                let value = self.regs.get(sr1).wrapping_add(self.operand(src));
                self.regs.define(dr, value);
            }

            Instruction::And { dr, sr1, src } => {
                let value = self.regs.get(sr1) & self.operand(src);
                self.regs.define(dr, value);
            }

            Instruction::Not { dr, sr } => {
                let value = !self.regs.get(sr);
                self.regs.define(dr, value);
            }

            // ==================== Control ====================

            Instruction::Br { nzp, offset } => {
                if nzp & self.regs.cond.bits() != 0 {
                    let target = self.regs.pc_relative(offset);
                    self.regs.jump(target);
                }
            }

            Instruction::Jmp { base } => {
                let target = self.regs.get(base);
                self.regs.jump(target);
            }

            Instruction::Jsr { offset } => {
                let target = self.regs.pc_relative(offset);
                self.regs.set(Reg::R7, self.regs.pc);
                self.regs.jump(target);
            }

            Instruction::Jsrr { base } => {
                // Read the base first: JSRR R7 jumps to the old R7
                let target = self.regs.get(base);
                self.regs.set(Reg::R7, self.regs.pc);
                self.regs.jump(target);
            }

            Instruction::Trap { vector } => {
                self.regs.set(Reg::R7, self.regs.pc);
                if let Some(fault) = self.trap(vector)? {
                    self.fault(fault, pc);
                }
            }

            // ==================== Data Movement ====================

            Instruction::Ld { dr, offset } => {
                let addr = self.regs.pc_relative(offset);
                let value = self.mem_read(addr)?;
                self.regs.define(dr, value);
            }

            Instruction::Ldi { dr, offset } => {
                let ptr = self.mem_read(self.regs.pc_relative(offset))?;
                let value = self.mem_read(ptr)?;
                self.regs.define(dr, value);
            }

            Instruction::Ldr { dr, base, offset } => {
                let addr = self.regs.get(base).wrapping_add(offset);
                let value = self.mem_read(addr)?;
                self.regs.define(dr, value);
            }

            Instruction::Lea { dr, offset } => {
                let addr = self.regs.pc_relative(offset);
                self.regs.define(dr, addr);
            }

            Instruction::St { sr, offset } => {
                let addr = self.regs.pc_relative(offset);
                self.mem.write(addr, self.regs.get(sr));
            }

            Instruction::Sti { sr, offset } => {
                let addr = self.mem_read(self.regs.pc_relative(offset))?;
                self.mem.write(addr, self.regs.get(sr));
            }

            Instruction::Str { sr, base, offset } => {
                let addr = self.regs.get(base).wrapping_add(offset);
                self.mem.write(addr, self.regs.get(sr));
            }
        }

        Ok(())
    }

    #[inline]
    fn operand(&self, src: Operand) -> u16 {
        match src {
            Operand::Reg(reg) => self.regs.get(reg),
            Operand::Imm(imm) => imm,
        }
    }

    /// Read memory through the device layer.
    #[inline]
    pub(crate) fn mem_read(&mut self, addr: u16) -> Result<u16, MachineError> {
        Ok(self.mem.read(addr, &mut self.console)?)
    }

    /// Stop the CPU on a fault raised by the instruction at `pc`.
    fn fault(&mut self, fault: Fault, pc: u16) -> CpuState {
        log::warn!("fault at x{:04X}: {}", pc, fault);
        self.state = CpuState::Faulted { fault, pc };
        self.state
    }

    /// Stop the CPU after a HALT trap.
    pub(crate) fn halt(&mut self) {
        log::info!("halted after {} instructions", self.cycles);
        self.state = CpuState::Halted;
    }

    /// Current execution state.
    pub fn state(&self) -> CpuState {
        self.state
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// The attached console.
    pub fn console(&self) -> &C {
        &self.console
    }

    /// The attached console, mutably.
    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }
}

impl<C> std::fmt::Debug for Machine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, sign_extend};
    use crate::cpu::memory::{KBDR, KBSR, KEY_READY};
    use crate::host::BufferConsole;

    const HALT: Instruction = Instruction::Trap { vector: 0x25 };

    fn machine_with(program: &[Instruction]) -> Machine<BufferConsole> {
        machine_with_input(program, "")
    }

    fn machine_with_input(program: &[Instruction], input: &str) -> Machine<BufferConsole> {
        let mut machine = Machine::new(BufferConsole::with_input(input));
        let words: Vec<u16> = program.iter().map(encode).collect();
        machine.mem.load(PC_START, &words);
        machine.start();
        machine
    }

    fn imm5(value: i16) -> Operand {
        Operand::Imm(sign_extend(value as u16, 5))
    }

    fn off9(value: i16) -> u16 {
        sign_extend(value as u16, 9)
    }

    #[test]
    fn test_run_sets_entry_state() {
        let mut machine = machine_with(&[HALT]);
        machine.regs.pc = 0x1234;
        machine.regs.cond = Flag::Negative;

        let outcome = machine.run().unwrap();

        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(machine.regs.pc, PC_START + 1);
        assert_eq!(machine.regs.cond, Flag::Zero);
        assert_eq!(machine.cycles, 1);
    }

    #[test]
    fn test_add_immediate_negative_one() {
        let mut machine = machine_with(&[
            Instruction::Add { dr: Reg::R0, sr1: Reg::R1, src: imm5(-1) },
            HALT,
        ]);
        machine.regs.set(Reg::R1, 5);

        machine.step().unwrap();

        assert_eq!(machine.regs.get(Reg::R0), 4);
        assert_eq!(machine.regs.cond, Flag::Positive);
    }

    #[test]
    fn test_add_wraps() {
        let mut machine = machine_with(&[Instruction::Add {
            dr: Reg::R2,
            sr1: Reg::R0,
            src: Operand::Reg(Reg::R1),
        }]);
        machine.regs.set(Reg::R0, 0xFFFF);
        machine.regs.set(Reg::R1, 0x0002);

        machine.step().unwrap();

        assert_eq!(machine.regs.get(Reg::R2), 1);
        assert_eq!(machine.regs.cond, Flag::Positive);
    }

    #[test]
    fn test_and_of_zero_registers_is_zero() {
        let mut machine = machine_with(&[Instruction::And {
            dr: Reg::R3,
            sr1: Reg::R1,
            src: Operand::Reg(Reg::R2),
        }]);
        machine.regs.cond = Flag::Positive;

        machine.step().unwrap();

        assert_eq!(machine.regs.get(Reg::R3), 0);
        assert_eq!(machine.regs.cond, Flag::Zero);
    }

    #[test]
    fn test_and_runs_once_and_not_runs_once() {
        // Each opcode executes independently: AND must not fall into NOT
        let mut machine = machine_with(&[
            Instruction::And { dr: Reg::R0, sr1: Reg::R0, src: imm5(0x0F) },
            Instruction::Not { dr: Reg::R1, sr: Reg::R0 },
        ]);
        machine.regs.set(Reg::R0, 0x00F5);

        machine.step().unwrap();
        assert_eq!(machine.regs.get(Reg::R0), 0x0005);
        assert_eq!(machine.regs.get(Reg::R1), 0);

        machine.step().unwrap();
        assert_eq!(machine.regs.get(Reg::R1), 0xFFFA);
        assert_eq!(machine.regs.cond, Flag::Negative);
    }

    #[test]
    fn test_branch_taken_relative_to_incremented_pc() {
        let mut machine = machine_with(&[Instruction::Br { nzp: 0b010, offset: off9(3) }]);

        machine.step().unwrap();

        assert_eq!(machine.regs.pc, PC_START + 1 + 3);
    }

    #[test]
    fn test_branch_backwards() {
        let mut machine = machine_with(&[Instruction::Br { nzp: 0b111, offset: off9(-1) }]);

        machine.step().unwrap();

        assert_eq!(machine.regs.pc, PC_START);
    }

    #[test]
    fn test_branch_not_taken() {
        let mut machine = machine_with(&[Instruction::Br { nzp: 0b101, offset: off9(10) }]);
        // COND is Z after start()

        machine.step().unwrap();

        assert_eq!(machine.regs.pc, PC_START + 1);
    }

    #[test]
    fn test_branch_does_not_touch_flags() {
        let mut machine = machine_with(&[Instruction::Br { nzp: 0b000, offset: 0 }]);
        machine.regs.cond = Flag::Negative;

        machine.step().unwrap();

        assert_eq!(machine.regs.cond, Flag::Negative);
    }

    #[test]
    fn test_jsr_offset() {
        let mut machine = machine_with(&[]);
        machine.mem.write(0x3001, encode(&Instruction::Jsr { offset: 0xFFFF }));
        machine.regs.pc = 0x3001;

        machine.step().unwrap();

        // PC was 0x3002 after fetch; R7 holds it and the jump goes back by one
        assert_eq!(machine.regs.get(Reg::R7), 0x3002);
        assert_eq!(machine.regs.pc, 0x3001);
    }

    #[test]
    fn test_jsr_offset_from_start() {
        // The 0x7FF offset applied to an already-incremented PC of 0x3001
        let mut machine = machine_with(&[Instruction::Jsr { offset: sign_extend(0x7FF, 11) }]);

        machine.step().unwrap();

        assert_eq!(machine.regs.get(Reg::R7), 0x3001);
        assert_eq!(machine.regs.pc, 0x3000);
    }

    #[test]
    fn test_jsrr_uses_base_register() {
        let mut machine = machine_with(&[Instruction::Jsrr { base: Reg::R4 }]);
        machine.regs.set(Reg::R4, 0x4000);

        machine.step().unwrap();

        assert_eq!(machine.regs.get(Reg::R7), PC_START + 1);
        assert_eq!(machine.regs.pc, 0x4000);
    }

    #[test]
    fn test_jsrr_through_r7() {
        let mut machine = machine_with(&[Instruction::Jsrr { base: Reg::R7 }]);
        machine.regs.set(Reg::R7, 0x5000);

        machine.step().unwrap();

        assert_eq!(machine.regs.pc, 0x5000);
        assert_eq!(machine.regs.get(Reg::R7), PC_START + 1);
    }

    #[test]
    fn test_jmp_and_ret() {
        let mut machine = machine_with(&[Instruction::Jmp { base: Reg::R7 }]);
        machine.regs.set(Reg::R7, 0x3100);

        machine.step().unwrap();

        assert_eq!(machine.regs.pc, 0x3100);
    }

    #[test]
    fn test_ld_and_lea() {
        let mut machine = machine_with(&[
            Instruction::Ld { dr: Reg::R1, offset: off9(1) },
            Instruction::Lea { dr: Reg::R2, offset: off9(-2) },
        ]);
        machine.mem.write(0x3002, 0x8001);

        machine.step().unwrap();
        assert_eq!(machine.regs.get(Reg::R1), 0x8001);
        assert_eq!(machine.regs.cond, Flag::Negative);

        machine.step().unwrap();
        assert_eq!(machine.regs.get(Reg::R2), 0x3000);
        assert_eq!(machine.regs.cond, Flag::Positive);
    }

    #[test]
    fn test_ldi_double_dereference() {
        let mut machine = machine_with(&[Instruction::Ldi { dr: Reg::R0, offset: off9(4) }]);
        machine.mem.write(0x3005, 0x4000);
        machine.mem.write(0x4000, 0x002A);

        machine.step().unwrap();

        assert_eq!(machine.regs.get(Reg::R0), 0x002A);
        assert_eq!(machine.regs.cond, Flag::Positive);
    }

    #[test]
    fn test_ldr_str_base_offset() {
        let mut machine = machine_with(&[
            Instruction::Ldr { dr: Reg::R0, base: Reg::R6, offset: sign_extend(0x3F, 6) },
            Instruction::Str { sr: Reg::R0, base: Reg::R6, offset: 5 },
        ]);
        machine.regs.set(Reg::R6, 0x4000);
        machine.mem.write(0x3FFF, 0);

        machine.step().unwrap();
        assert_eq!(machine.regs.get(Reg::R0), 0);
        assert_eq!(machine.regs.cond, Flag::Zero);

        machine.regs.set(Reg::R0, 0x1234);
        machine.step().unwrap();
        assert_eq!(machine.mem.peek(0x4005), 0x1234);
    }

    #[test]
    fn test_st_and_sti() {
        let mut machine = machine_with(&[
            Instruction::St { sr: Reg::R3, offset: off9(5) },
            Instruction::Sti { sr: Reg::R3, offset: off9(5) },
        ]);
        machine.regs.set(Reg::R3, 0x4100);
        machine.regs.cond = Flag::Negative;

        machine.step().unwrap();
        assert_eq!(machine.mem.peek(0x3006), 0x4100);

        // STI reads the pointer at 0x3007 and stores through it
        machine.mem.write(0x3007, 0x5000);
        machine.step().unwrap();
        assert_eq!(machine.mem.peek(0x5000), 0x4100);

        // Stores never touch COND
        assert_eq!(machine.regs.cond, Flag::Negative);
    }

    #[test]
    fn test_pc_relative_wraps() {
        let mut machine = machine_with(&[]);
        machine.mem.write(0xFFFF, encode(&Instruction::Lea { dr: Reg::R0, offset: off9(2) }));
        machine.regs.pc = 0xFFFF;

        machine.step().unwrap();

        assert_eq!(machine.regs.pc, 0x0000);
        assert_eq!(machine.regs.get(Reg::R0), 0x0002);
    }

    #[test]
    fn test_ld_from_kbsr_polls_keyboard() {
        let mut machine = machine_with_input(
            &[
                Instruction::Ldi { dr: Reg::R1, offset: off9(2) },
                Instruction::Ldi { dr: Reg::R2, offset: off9(2) },
                HALT,
            ],
            "k",
        );
        machine.mem.write(0x3003, KBSR);
        machine.mem.write(0x3004, KBDR);

        let outcome = machine.resume().unwrap();

        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(machine.regs.get(Reg::R1), KEY_READY);
        assert_eq!(machine.regs.get(Reg::R2), u16::from(b'k'));
    }

    #[test]
    fn test_illegal_opcodes_fault() {
        for word in [0x8000u16, 0xD000] {
            let mut machine = Machine::new(BufferConsole::new());
            machine.mem.write(PC_START, word);
            machine.mem.write(PC_START + 1, encode(&HALT));

            let outcome = machine.run().unwrap();

            assert_eq!(
                outcome,
                RunOutcome::FatalOpcode {
                    fault: Fault::IllegalOpcode(Opcode::of(word)),
                    pc: PC_START,
                }
            );
            // Nothing after the fault was fetched
            assert_eq!(machine.cycles, 1);
            assert_eq!(machine.regs.pc, PC_START + 1);
            assert!(machine.console().output().is_empty());
        }
    }

    #[test]
    fn test_stopped_cpu_does_not_fetch() {
        let mut machine = machine_with(&[HALT, Instruction::Add {
            dr: Reg::R0,
            sr1: Reg::R0,
            src: imm5(1),
        }]);

        assert_eq!(machine.step().unwrap(), CpuState::Halted);
        assert_eq!(machine.step().unwrap(), CpuState::Halted);

        assert_eq!(machine.cycles, 1);
        assert_eq!(machine.regs.get(Reg::R0), 0);
    }

    #[test]
    fn test_run_limited_stops_infinite_loop() {
        // BRnzp #-1 spins forever
        let mut machine = machine_with(&[Instruction::Br { nzp: 0b111, offset: off9(-1) }]);

        let outcome = machine.run_limited(100).unwrap();

        assert_eq!(outcome, None);
        assert_eq!(machine.cycles, 100);
        assert!(machine.is_running());
    }

    #[test]
    fn test_countdown_loop() {
        // R0 := 3; loop: R1 += 2; R0 -= 1; BRp loop; HALT
        let mut machine = machine_with(&[
            Instruction::And { dr: Reg::R0, sr1: Reg::R0, src: imm5(0) },
            Instruction::Add { dr: Reg::R0, sr1: Reg::R0, src: imm5(3) },
            Instruction::Add { dr: Reg::R1, sr1: Reg::R1, src: imm5(2) },
            Instruction::Add { dr: Reg::R0, sr1: Reg::R0, src: imm5(-1) },
            Instruction::Br { nzp: 0b001, offset: off9(-3) },
            HALT,
        ]);

        let outcome = machine.run().unwrap();

        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(machine.regs.get(Reg::R0), 0);
        assert_eq!(machine.regs.get(Reg::R1), 6);
        assert_eq!(machine.regs.cond, Flag::Zero);
    }

    #[test]
    fn test_subroutine_call_and_return() {
        // JSR sub; HALT; sub: ADD R2, R2, #7; RET
        let mut machine = machine_with(&[
            Instruction::Jsr { offset: 1 },
            HALT,
            Instruction::Add { dr: Reg::R2, sr1: Reg::R2, src: imm5(7) },
            Instruction::Jmp { base: Reg::R7 },
        ]);

        let outcome = machine.run().unwrap();

        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(machine.regs.get(Reg::R2), 7);
        assert_eq!(machine.cycles, 4);
    }

    #[test]
    fn test_load_bytes_then_run() {
        let mut machine = Machine::new(BufferConsole::new());
        // origin x3000: ADD R1, R1, #9; HALT
        let bytes = [0x30, 0x00, 0x12, 0x69, 0xF0, 0x25];

        let written = machine.load_bytes(&bytes).unwrap();
        let outcome = machine.run().unwrap();

        assert_eq!(written, 2);
        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(machine.regs.get(Reg::R1), 9);
    }

    #[test]
    fn test_load_image_from_reader_overlapping() {
        let mut machine = Machine::new(BufferConsole::new());
        // First image: x3000 = ADD R0, R0, #1; HALT. Second overwrites x3000 with ADD R0, R0, #2
        let first: &[u8] = &[0x30, 0x00, 0x10, 0x21, 0xF0, 0x25];
        let second: &[u8] = &[0x30, 0x00, 0x10, 0x22];

        machine.load_image(io::Cursor::new(first)).unwrap();
        machine.load_image(io::Cursor::new(second)).unwrap();
        machine.run().unwrap();

        assert_eq!(machine.regs.get(Reg::R0), 2);
    }

    #[test]
    fn test_reset_clears_machine() {
        let mut machine = machine_with(&[HALT]);
        machine.run().unwrap();

        machine.reset();

        assert!(machine.is_running());
        assert_eq!(machine.cycles, 0);
        assert_eq!(machine.mem.peek(PC_START), 0);
        assert_eq!(machine.regs, Registers::new());
        // The console and what it captured survive a reset
        assert_eq!(machine.console().output_string(), "HALT\n");
    }

    #[test]
    fn test_starved_getc_reruns_after_input_arrives() {
        let mut machine = machine_with(&[
            Instruction::Trap { vector: 0x20 },
            Instruction::Trap { vector: 0x21 },
            HALT,
        ]);
        machine.regs.set(Reg::R7, 0x1234);
        machine.regs.cond = Flag::Negative;

        assert!(matches!(machine.step(), Err(MachineError::Io(_))));

        // Nothing retired: the GETC is still next
        assert_eq!(machine.regs.pc, PC_START);
        assert_eq!(machine.regs.get(Reg::R7), 0x1234);
        assert_eq!(machine.regs.cond, Flag::Negative);
        assert_eq!(machine.cycles, 0);
        assert!(machine.is_running());

        machine.console_mut().push_input("x");
        let outcome = machine.resume().unwrap();

        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(machine.console().output_string(), "xHALT\n");
        assert_eq!(machine.console().pending_input(), 0);
        assert_eq!(machine.cycles, 3);
    }

    #[test]
    fn test_failed_keyboard_poll_does_not_retire() {
        // LDI through KBSR polls the console; a failing poll leaves the LDI next
        struct Failing;

        impl Console for Failing {
            fn key_ready(&mut self) -> io::Result<bool> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }

            fn read_char(&mut self) -> io::Result<u8> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }

            fn write_bytes(&mut self, _bytes: &[u8]) -> io::Result<()> {
                Ok(())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut machine = Machine::new(Failing);
        machine.mem.write(PC_START, encode(&Instruction::Ldi { dr: Reg::R0, offset: 0 }));
        machine.mem.write(PC_START + 1, KBSR);
        machine.start();

        assert!(machine.step().is_err());
        assert_eq!(machine.regs.pc, PC_START);
        assert_eq!(machine.regs.get(Reg::R0), 0);
        assert_eq!(machine.cycles, 0);
    }

    #[test]
    fn test_interrupted_io_maps_to_interrupted() {
        let err = MachineError::from(io::Error::new(io::ErrorKind::Interrupted, "ctrl-c"));
        assert!(matches!(err, MachineError::Interrupted));

        let err = MachineError::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(err, MachineError::Io(_)));
    }
}
