//! Breakpoint tracking and the step/step-over/run-until stepper protocol
//! that the command dispatcher drives on top of it (§4.3).
//!
//! A breakpoint is implemented by overwriting RAM with a `BRK` opcode and
//! remembering the original byte; ROM breakpoints can't be injected that
//! way, so they're tracked in a side set and matched by polling `pc` after
//! every instruction the core executes.

use std::collections::{BTreeMap, HashSet};

use crate::emulation_core::{EmulationCore, Registers, StopReason};
use crate::error::BreakpointError;
use crate::opcodes::{OpcodeTable, BRK_OPCODE, ROM_START};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    Ram,
    Rom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub address: u16,
    pub kind: BreakpointKind,
    pub original_byte: Option<u8>,
    pub enabled: bool,
    pub hit_count: u64,
}

fn classify(addr: u16) -> BreakpointKind {
    if addr >= ROM_START {
        BreakpointKind::Rom
    } else {
        BreakpointKind::Ram
    }
}

#[derive(Debug, Default)]
pub struct BreakpointManager {
    breakpoints: BTreeMap<u16, Breakpoint>,
    rom_set: HashSet<u16>,
    temporary: Option<Breakpoint>,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        addr: u16,
        memory: &mut dyn EmulationCore,
    ) -> Result<(Breakpoint, bool), BreakpointError> {
        if self.breakpoints.contains_key(&addr) {
            return Err(BreakpointError::AlreadySet(addr));
        }
        let kind = classify(addr);
        let bp = match kind {
            BreakpointKind::Ram => {
                let original = memory.read_memory(addr);
                memory.write_memory(addr, BRK_OPCODE);
                Breakpoint { address: addr, kind, original_byte: Some(original), enabled: true, hit_count: 0 }
            }
            BreakpointKind::Rom => {
                self.rom_set.insert(addr);
                Breakpoint { address: addr, kind, original_byte: None, enabled: true, hit_count: 0 }
            }
        };
        let is_rom = kind == BreakpointKind::Rom;
        self.breakpoints.insert(addr, bp);
        tracing::debug!(addr, is_rom, "breakpoint set");
        Ok((bp, is_rom))
    }

    pub fn clear(&mut self, addr: u16, memory: &mut dyn EmulationCore) -> Result<(), BreakpointError> {
        let bp = self.breakpoints.remove(&addr).ok_or(BreakpointError::NotFound(addr))?;
        match bp.kind {
            BreakpointKind::Ram => {
                if let Some(original) = bp.original_byte {
                    memory.write_memory(addr, original);
                }
            }
            BreakpointKind::Rom => {
                self.rom_set.remove(&addr);
            }
        }
        tracing::debug!(addr, "breakpoint cleared");
        Ok(())
    }

    pub fn clear_all(&mut self, memory: &mut dyn EmulationCore) {
        for (addr, bp) in self.breakpoints.iter() {
            if let (BreakpointKind::Ram, Some(original)) = (bp.kind, bp.original_byte) {
                memory.write_memory(*addr, original);
            }
        }
        self.breakpoints.clear();
        self.rom_set.clear();
        self.temporary = None;
        tracing::debug!("all breakpoints cleared");
    }

    pub fn suspend(&mut self, addr: u16, memory: &mut dyn EmulationCore) {
        if let Some(bp) = self.breakpoints.get(&addr) {
            if let (BreakpointKind::Ram, Some(original)) = (bp.kind, bp.original_byte) {
                memory.write_memory(addr, original);
            }
        }
        tracing::debug!(addr, "breakpoint suspended");
    }

    pub fn resume(&mut self, addr: u16, memory: &mut dyn EmulationCore) {
        if let Some(bp) = self.breakpoints.get(&addr) {
            if bp.kind == BreakpointKind::Ram {
                memory.write_memory(addr, BRK_OPCODE);
            }
        }
        tracing::debug!(addr, "breakpoint resumed");
    }

    pub fn disable(&mut self, addr: u16, memory: &mut dyn EmulationCore) -> Result<(), BreakpointError> {
        let bp = self.breakpoints.get_mut(&addr).ok_or(BreakpointError::NotFound(addr))?;
        bp.enabled = false;
        match bp.kind {
            BreakpointKind::Ram => {
                if let Some(original) = bp.original_byte {
                    memory.write_memory(addr, original);
                }
            }
            BreakpointKind::Rom => {
                self.rom_set.remove(&addr);
            }
        }
        tracing::debug!(addr, "breakpoint disabled");
        Ok(())
    }

    pub fn enable(&mut self, addr: u16, memory: &mut dyn EmulationCore) -> Result<(), BreakpointError> {
        let bp = self.breakpoints.get_mut(&addr).ok_or(BreakpointError::NotFound(addr))?;
        bp.enabled = true;
        match bp.kind {
            BreakpointKind::Ram => {
                memory.write_memory(addr, BRK_OPCODE);
            }
            BreakpointKind::Rom => {
                self.rom_set.insert(addr);
            }
        }
        tracing::debug!(addr, "breakpoint enabled");
        Ok(())
    }

    pub fn set_temporary(&mut self, addr: u16, memory: &mut dyn EmulationCore) {
        if self.breakpoints.contains_key(&addr) {
            return;
        }
        let kind = classify(addr);
        let bp = match kind {
            BreakpointKind::Ram => {
                let original = memory.read_memory(addr);
                memory.write_memory(addr, BRK_OPCODE);
                Breakpoint { address: addr, kind, original_byte: Some(original), enabled: true, hit_count: 0 }
            }
            BreakpointKind::Rom => {
                self.rom_set.insert(addr);
                Breakpoint { address: addr, kind, original_byte: None, enabled: true, hit_count: 0 }
            }
        };
        self.temporary = Some(bp);
    }

    pub fn clear_temporary(&mut self, memory: &mut dyn EmulationCore) {
        if let Some(bp) = self.temporary.take() {
            match bp.kind {
                BreakpointKind::Ram => {
                    if let Some(original) = bp.original_byte {
                        memory.write_memory(bp.address, original);
                    }
                }
                BreakpointKind::Rom => {
                    self.rom_set.remove(&bp.address);
                }
            }
        }
    }

    pub fn record_hit(&mut self, addr: u16) {
        if let Some(bp) = self.breakpoints.get_mut(&addr) {
            bp.hit_count += 1;
        }
    }

    pub fn get_breakpoint(&self, addr: u16) -> Option<Breakpoint> {
        self.breakpoints.get(&addr).copied()
    }

    pub fn has_breakpoint(&self, addr: u16) -> bool {
        self.breakpoints.contains_key(&addr)
    }

    pub fn is_temporary_breakpoint(&self, addr: u16) -> bool {
        self.temporary.map(|bp| bp.address == addr).unwrap_or(false)
    }

    pub fn get_original_byte(&self, addr: u16) -> Option<u8> {
        self.breakpoints.get(&addr).and_then(|bp| bp.original_byte)
    }

    pub fn get_all_breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.values().copied().collect()
    }

    pub fn get_all_addresses(&self) -> Vec<u16> {
        self.breakpoints.keys().copied().collect()
    }

    pub fn rom_breakpoints(&self) -> Vec<u16> {
        let mut addrs: Vec<u16> = self.rom_set.iter().copied().collect();
        addrs.sort();
        addrs
    }

    pub fn has_rom_breakpoints(&self) -> bool {
        !self.rom_set.is_empty()
    }

    pub fn check_rom_breakpoint(&self, addr: u16) -> bool {
        self.rom_set.contains(&addr)
    }
}

/// Result of a stepper-protocol operation (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub success: bool,
    pub breakpoint_hit: bool,
    pub breakpoint_address: Option<u16>,
    pub error_message: Option<String>,
    pub stopped_at: u16,
    pub instructions_executed: u64,
    pub registers: Registers,
}

const RUN_UNTIL_CAP: u64 = 1_000_000;

impl BreakpointManager {
    fn step_with_temporary(
        &mut self,
        core: &mut dyn EmulationCore,
        temp_target: u16,
    ) -> StepResult {
        let pc = core.read_registers().pc;
        let had_permanent = self.has_breakpoint(pc);
        if had_permanent {
            self.suspend(pc, core);
        }
        self.set_temporary(temp_target, core);
        let (registers, executed, reason) = core.run_until_brk_or_pc(temp_target, RUN_UNTIL_CAP);
        self.clear_temporary(core);
        if had_permanent {
            self.resume(pc, core);
        }
        let breakpoint_hit = reason == StopReason::Brk;
        if breakpoint_hit {
            self.record_hit(registers.pc.wrapping_sub(1));
        }
        StepResult {
            success: true,
            breakpoint_hit,
            breakpoint_address: breakpoint_hit.then(|| registers.pc.wrapping_sub(1)),
            error_message: None,
            stopped_at: registers.pc,
            instructions_executed: executed,
            registers,
        }
    }

    /// Step exactly one instruction, transparently routing through any
    /// permanent breakpoint at the current PC. The instruction length is
    /// computed from the real opcode at `pc`, not the injected `BRK` byte a
    /// RAM breakpoint overlays it with.
    pub fn step_one(&mut self, core: &mut dyn EmulationCore) -> StepResult {
        let pc = core.read_registers().pc;
        let opcode = self.get_original_byte(pc).unwrap_or_else(|| core.read_memory(pc));
        let length = OpcodeTable::instruction_length(opcode).max(1) as u16;
        self.step_with_temporary(core, pc.wrapping_add(length))
    }

    /// Step over the instruction at the current PC (used for `JSR`): the
    /// temporary lands three bytes past PC regardless of what's there.
    pub fn step_over(&mut self, core: &mut dyn EmulationCore) -> StepResult {
        let pc = core.read_registers().pc;
        self.step_with_temporary(core, pc.wrapping_add(3))
    }

    /// Step `count` instructions, stopping early if a permanent breakpoint
    /// other than the starting PC is hit.
    pub fn step_n(&mut self, core: &mut dyn EmulationCore, count: u64) -> StepResult {
        let start_pc = core.read_registers().pc;
        let mut total_executed = 0u64;
        let mut result = StepResult {
            success: true,
            breakpoint_hit: false,
            breakpoint_address: None,
            error_message: None,
            stopped_at: start_pc,
            instructions_executed: 0,
            registers: core.read_registers(),
        };
        for _ in 0..count {
            let step = self.step_one(core);
            total_executed += step.instructions_executed;
            result = step;
            if result.breakpoint_hit
                && result.breakpoint_address.map(|a| a != start_pc).unwrap_or(false)
            {
                break;
            }
        }
        result.instructions_executed = total_executed;
        result
    }

    /// Run until a `BRK`, a permanent breakpoint, or `target` is reached.
    pub fn run_until(&mut self, core: &mut dyn EmulationCore, target: u16) -> StepResult {
        self.set_temporary(target, core);
        let (registers, executed, reason) = core.run_until_brk_or_pc(target, RUN_UNTIL_CAP);
        self.clear_temporary(core);
        match reason {
            StopReason::TimedOut => StepResult {
                success: false,
                breakpoint_hit: false,
                breakpoint_address: None,
                error_message: Some(format!(
                    "Run until ${target:04X} timed out after {executed} instructions"
                )),
                stopped_at: registers.pc,
                instructions_executed: executed,
                registers,
            },
            StopReason::Brk => {
                let hit_addr = registers.pc.wrapping_sub(1);
                self.record_hit(hit_addr);
                StepResult {
                    success: true,
                    breakpoint_hit: true,
                    breakpoint_address: Some(hit_addr),
                    error_message: None,
                    stopped_at: registers.pc,
                    instructions_executed: executed,
                    registers,
                }
            }
            StopReason::PcMatch => StepResult {
                success: true,
                breakpoint_hit: false,
                breakpoint_address: None,
                error_message: None,
                stopped_at: registers.pc,
                instructions_executed: executed,
                registers,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation_core::SoftEmulationCore;

    #[test]
    fn set_ram_breakpoint_injects_brk_and_remembers_original() {
        let mut core = SoftEmulationCore::new(0x100);
        core.write_memory(0x10, 0xEA);
        let mut mgr = BreakpointManager::new();
        let (bp, is_rom) = mgr.set(0x10, &mut core).unwrap();
        assert!(!is_rom);
        assert_eq!(bp.original_byte, Some(0xEA));
        assert_eq!(core.read_memory(0x10), BRK_OPCODE);
    }

    #[test]
    fn set_rom_breakpoint_does_not_touch_memory() {
        let mut core = SoftEmulationCore::new(0x10000);
        core.write_memory(0xE000, 0x4C);
        let mut mgr = BreakpointManager::new();
        let (_, is_rom) = mgr.set(0xE000, &mut core).unwrap();
        assert!(is_rom);
        assert_eq!(core.read_memory(0xE000), 0x4C);
        assert!(mgr.has_rom_breakpoints());
    }

    #[test]
    fn clear_restores_original_byte() {
        let mut core = SoftEmulationCore::new(0x100);
        core.write_memory(0x10, 0xEA);
        let mut mgr = BreakpointManager::new();
        mgr.set(0x10, &mut core).unwrap();
        mgr.clear(0x10, &mut core).unwrap();
        assert_eq!(core.read_memory(0x10), 0xEA);
        assert!(!mgr.has_breakpoint(0x10));
    }

    #[test]
    fn double_set_fails_already_set() {
        let mut core = SoftEmulationCore::new(0x100);
        let mut mgr = BreakpointManager::new();
        mgr.set(0x10, &mut core).unwrap();
        assert_eq!(mgr.set(0x10, &mut core).unwrap_err(), BreakpointError::AlreadySet(0x10));
    }

    #[test]
    fn clear_missing_fails_not_found() {
        let mut core = SoftEmulationCore::new(0x100);
        let mut mgr = BreakpointManager::new();
        assert_eq!(mgr.clear(0x10, &mut core).unwrap_err(), BreakpointError::NotFound(0x10));
    }

    #[test]
    fn step_one_advances_past_a_single_instruction() {
        let mut core = SoftEmulationCore::new(0x100);
        core.registers.pc = 0x10;
        core.write_memory(0x10, 0xEA); // NOP, 1 byte
        let mut mgr = BreakpointManager::new();
        let result = mgr.step_one(&mut core);
        assert!(result.success);
        assert_eq!(result.stopped_at, 0x11);
        assert_eq!(result.instructions_executed, 1);
    }

    #[test]
    fn run_until_stops_at_target() {
        let mut core = SoftEmulationCore::new(0x100);
        core.registers.pc = 0x10;
        let mut mgr = BreakpointManager::new();
        let result = mgr.run_until(&mut core, 0x14);
        assert!(result.success);
        assert!(!result.breakpoint_hit);
        assert_eq!(result.stopped_at, 0x14);
        assert!(!mgr.has_breakpoint(0x14), "temporary must not leak into permanent table");
    }

    #[test]
    fn run_until_reports_permanent_breakpoint_hit() {
        let mut core = SoftEmulationCore::new(0x100);
        core.registers.pc = 0x10;
        core.write_memory(0x12, 0xEA);
        let mut mgr = BreakpointManager::new();
        mgr.set(0x12, &mut core).unwrap();
        let result = mgr.run_until(&mut core, 0x20);
        assert!(result.breakpoint_hit);
        assert_eq!(result.breakpoint_address, Some(0x12));
    }
}
