pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod clock;
pub mod config;
pub mod cpu;
pub mod interrupt;
pub mod mapper;
pub mod opcodes;
pub mod ppu;
pub mod savestate;
pub mod trace;

use anyhow::Result;
use std::{collections::VecDeque, path::Path};

use apu::{Apu, ApuState};
use bus::{Bus, CartridgeSlot, MemoryState};
use cartridge::Cartridge;
use clock::{
    ClockEvents, ClockHost, ClockedComponent, ComponentId, FrameCompleted, Halt, TimingCoordinator,
    TimingMode, TimingState,
};
use config::NesConfig;
use cpu::{Cpu, CpuEvent, CpuState};
use interrupt::InterruptKind;
use ppu::{Ppu, PpuState};
use savestate::{SaveStateError, Snapshot};
use trace::TraceHook;

pub const BUTTON_A: u8 = 0x01;
pub const BUTTON_B: u8 = 0x02;
pub const BUTTON_SELECT: u8 = 0x04;
pub const BUTTON_START: u8 = 0x08;
pub const BUTTON_UP: u8 = 0x10;
pub const BUTTON_DOWN: u8 = 0x20;
pub const BUTTON_LEFT: u8 = 0x40;
pub const BUTTON_RIGHT: u8 = 0x80;

/// Upper bound on ticks one instruction can take, OAM DMA stall included.
const MAX_INSTRUCTION_TICKS: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct NesDebugCounters {
    pub frame_count: u64,
    pub cpu_instructions: u64,
    pub cpu_reads: u64,
    pub cpu_writes: u64,
    pub cpu_reads_ram: u64,
    pub cpu_reads_ppu_regs: u64,
    pub cpu_reads_apu_io: u64,
    pub cpu_reads_cart: u64,
    pub cpu_writes_ram: u64,
    pub cpu_writes_ppu_regs: u64,
    pub cpu_writes_apu_io: u64,
    pub cpu_writes_cart: u64,
    pub ppu_cycles: u64,
    pub apu_ticks: u64,
    pub dma_transfers: u64,
    pub nmi_edges: u64,
    pub nmi_serviced_count: u64,
    pub irq_serviced_count: u64,
    pub last_cpu_read_addr: u16,
    pub last_cpu_write_addr: u16,
    pub last_cpu_write_value: u8,
}

/// CPU plus everything on its bus; the clock drives it through [`ClockHost`].
pub struct Console {
    pub(crate) cpu: Cpu,
    pub(crate) bus: Bus,
    debug_events: VecDeque<String>,
    debug_event_capacity: usize,
}

impl Console {
    fn new(cartridge: CartridgeSlot, debug_event_capacity: usize) -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(cartridge),
            debug_events: VecDeque::with_capacity(debug_event_capacity.min(4096)),
            debug_event_capacity: debug_event_capacity.max(1),
        }
    }

    fn push_debug_event<S: Into<String>>(&mut self, event: S) {
        if self.debug_events.len() >= self.debug_event_capacity {
            self.debug_events.pop_front();
        }
        self.debug_events.push_back(event.into());
    }

    fn poll_nmi(&mut self, events: &mut ClockEvents) {
        if self.bus.ppu.take_nmi() {
            self.cpu.request_interrupt(InterruptKind::Nmi);
            events.nmi_edges += 1;
            self.bus.debug.nmi_edges = self.bus.debug.nmi_edges.wrapping_add(1);
            let ppu = self.bus.ppu.state();
            log::trace!("NMI edge at scanline {} cycle {}", ppu.scanline, ppu.cycle);
        }
    }

    fn run_cpu_cycle(&mut self, events: &mut ClockEvents) {
        self.cpu.set_irq_line(self.bus.irq_line());
        match self.cpu.execute_cycle(&mut self.bus) {
            CpuEvent::InstructionCompleted { .. } => {
                events.instructions_completed += 1;
                self.bus.debug.cpu_instructions = self.bus.debug.cpu_instructions.wrapping_add(1);
            }
            CpuEvent::InterruptServiced(kind) => {
                events.interrupts_serviced += 1;
                let pc = self.cpu.state().pc;
                log::trace!("{kind:?} serviced -> PC=${pc:04X}");
                match kind {
                    InterruptKind::Nmi => {
                        self.bus.debug.nmi_serviced_count =
                            self.bus.debug.nmi_serviced_count.wrapping_add(1);
                    }
                    InterruptKind::Irq => {
                        self.bus.debug.irq_serviced_count =
                            self.bus.debug.irq_serviced_count.wrapping_add(1);
                        self.push_debug_event(format!("IRQ serviced -> PC=${pc:04X}"));
                    }
                    InterruptKind::Reset => {
                        self.push_debug_event(format!("soft reset -> PC=${pc:04X}"));
                    }
                }
            }
            CpuEvent::Halted { pc, opcode } => {
                events.halted = Some(Halt { pc, opcode });
                self.push_debug_event(format!("CPU halted on opcode ${opcode:02X} @ ${pc:04X}"));
            }
            CpuEvent::Busy | CpuEvent::Stalled | CpuEvent::Idle => {}
        }
        self.poll_nmi(events);
    }

    fn run_ppu_dot(&mut self, master_cycle: u64, events: &mut ClockEvents) {
        let dot = self.bus.tick_ppu();
        if dot.vblank_started {
            events.vblank_started += 1;
        }
        if dot.vblank_ended {
            events.vblank_ended += 1;
        }
        if dot.frame_completed {
            events.frames_completed += 1;
            self.bus.debug.frame_count = self.bus.debug.frame_count.wrapping_add(1);
            events.frame = Some(FrameCompleted {
                frame: self.bus.ppu.frame(),
                master_cycle,
                elapsed: None,
            });
        }
        self.poll_nmi(events);
    }
}

impl ClockHost for Console {
    fn synchronize_clock(
        &mut self,
        component: ComponentId,
        cycles: u32,
        master_cycle: u64,
    ) -> ClockEvents {
        let mut events = ClockEvents::default();
        for _ in 0..cycles {
            match component {
                ComponentId::Cpu => self.run_cpu_cycle(&mut events),
                ComponentId::Ppu => self.run_ppu_dot(master_cycle, &mut events),
                ComponentId::Apu => {
                    self.bus.tick_apu();
                }
            }
        }
        events
    }
}

pub struct Nes {
    console: Console,
    clock: TimingCoordinator,
    config: NesConfig,
    mapper_name: String,
}

impl Nes {
    /// Builds the whole system around a validated cartridge and runs the
    /// power-on reset. Fails only if the mapper cannot be created.
    pub fn from_cartridge(cartridge: Cartridge, config: NesConfig) -> Result<Self> {
        let mapper_id = cartridge.mapper_id;
        let mapper_name = format!("{} (mapper {mapper_id})", cartridge.mapper_name());
        log::info!(
            "cartridge loaded: {mapper_name}, PRG {} KB, CHR {} KB{}{}",
            cartridge.prg_rom.len() / 1024,
            cartridge.chr_data.len() / 1024,
            if cartridge.chr_is_ram { " (RAM)" } else { "" },
            if cartridge.has_battery_backed_ram {
                ", battery"
            } else {
                ""
            }
        );

        let slot = CartridgeSlot::new(cartridge)?;
        let mut clock = TimingCoordinator::new(config.timing_mode, config.track_wall_time);
        clock.register_component(ComponentId::Cpu);
        clock.register_component(ComponentId::Ppu);
        clock.register_component(ComponentId::Apu);

        let mut nes = Self {
            console: Console::new(slot, config.debug_event_capacity),
            clock,
            config,
            mapper_name,
        };
        nes.console
            .bus
            .ppu
            .set_pal_timing(nes.config.timing_mode == TimingMode::Pal);
        nes.reset();
        let loaded = format!("ROM loaded: {}", nes.mapper_name);
        nes.console.push_debug_event(loaded);
        Ok(nes)
    }

    pub fn from_rom_bytes(bytes: &[u8], config: NesConfig) -> Result<Self> {
        Self::from_cartridge(Cartridge::from_bytes(bytes)?, config)
    }

    pub fn from_rom_file(path: &Path, config: NesConfig) -> Result<Self> {
        Self::from_cartridge(Cartridge::from_file(path)?, config)
    }

    pub fn config(&self) -> &NesConfig {
        &self.config
    }

    pub fn mapper_name(&self) -> &str {
        &self.mapper_name
    }

    pub fn mapper_id(&self) -> u16 {
        self.console.bus.cartridge.mapper().id()
    }

    /// Hard reset: every component back to power-on, PC from $FFFC.
    /// Battery and CHR RAM on the cartridge are left alone.
    pub fn reset(&mut self) {
        self.console.bus.reset();
        <Cpu as ClockedComponent>::reset(&mut self.console.cpu, &mut self.console.bus);
        self.clock.reset();
        self.console.debug_events.clear();

        let pc = self.console.cpu.state().pc;
        log::debug!("CPU reset, PC=${pc:04X}");
        self.console.push_debug_event(format!("CPU reset, PC=${pc:04X}"));
    }

    pub fn request_interrupt(&mut self, kind: InterruptKind) {
        self.console.cpu.request_interrupt(kind);
    }

    pub fn timing_mode(&self) -> TimingMode {
        self.clock.timing_mode()
    }

    pub fn set_timing_mode(&mut self, mode: TimingMode) {
        self.clock.set_timing_mode(mode);
        self.console.bus.ppu.set_pal_timing(mode == TimingMode::Pal);
        self.config.timing_mode = mode;
    }

    /// Stops or resumes the clock; a stopped system ignores ticks.
    pub fn set_running(&mut self, running: bool) {
        self.clock.set_running(running);
    }

    /// One master tick: one CPU cycle and its PPU dots.
    pub fn execute_cycle(&mut self) -> ClockEvents {
        self.clock.execute_cycle(&mut self.console)
    }

    pub fn execute_cycles(&mut self, cycles: u64) -> ClockEvents {
        self.clock.execute_cycles(&mut self.console, cycles)
    }

    /// Ticks until an instruction or interrupt sequence completes, or the CPU halts.
    pub fn step_instruction(&mut self) -> ClockEvents {
        let mut events = ClockEvents::default();
        if !self.clock.is_running() {
            return events;
        }
        for _ in 0..MAX_INSTRUCTION_TICKS {
            events.merge(self.execute_cycle());
            if events.instructions_completed > 0
                || events.interrupts_serviced > 0
                || events.halted.is_some()
                || self.console.cpu.is_halted()
            {
                break;
            }
        }
        events
    }

    /// Ticks until the PPU finishes a frame or the configured guard trips.
    pub fn run_frame(&mut self) -> ClockEvents {
        let mut events = ClockEvents::default();
        if !self.clock.is_running() {
            return events;
        }
        let guard = self.config.frame_cycle_guard;
        for _ in 0..guard {
            events.merge(self.execute_cycle());
            if events.frames_completed > 0 {
                return events;
            }
        }
        log::warn!("frame guard tripped after {guard} master cycles");
        self.console
            .push_debug_event(format!("Frame guard tripped at {guard} master cycles"));
        events
    }

    pub fn set_controller_state(&mut self, port: usize, buttons: u8) {
        self.console.bus.set_controller_state(port, buttons);
    }

    /// Buttons last latched for `port`; 0 for a port that does not exist.
    pub fn controller_state(&self, port: usize) -> u8 {
        self.console.bus.controller_state(port)
    }

    pub fn set_trace_hook(&mut self, hook: Option<Box<dyn TraceHook>>) -> Option<Box<dyn TraceHook>> {
        self.console.bus.set_trace_hook(hook)
    }

    pub fn is_halted(&self) -> bool {
        self.console.cpu.is_halted()
    }

    pub fn frame(&self) -> u64 {
        self.console.bus.ppu.frame()
    }

    pub fn master_cycle(&self) -> u64 {
        self.clock.master_cycle()
    }

    pub fn cpu_state(&self) -> &CpuState {
        self.console.cpu.state()
    }

    pub fn ppu_state(&self) -> &PpuState {
        self.console.bus.ppu.state()
    }

    pub fn apu_state(&self) -> &ApuState {
        self.console.bus.apu.state()
    }

    pub fn timing_state(&self) -> &TimingState {
        self.clock.state()
    }

    pub fn memory_state(&self) -> MemoryState {
        self.console.bus.memory_state()
    }

    /// CPU-space read without side effects.
    pub fn peek(&self, addr: u16) -> u8 {
        self.console.bus.peek(addr)
    }

    /// PPU-space read without side effects.
    pub fn peek_ppu(&self, addr: u16) -> u8 {
        self.console.bus.peek_ppu(addr)
    }

    /// 256x240 palette-RAM colour indices of the background layer.
    pub fn render_background(&self) -> Vec<u8> {
        self.console.bus.render_background()
    }

    pub fn debug_counters(&self) -> NesDebugCounters {
        self.console.bus.debug
    }

    pub fn debug_mapper_state(&self) -> String {
        let state = self.console.bus.cartridge.mapper().debug_state();
        if state.is_empty() {
            self.mapper_name.clone()
        } else {
            state
        }
    }

    /// Newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<String> {
        self.console
            .debug_events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Result<Snapshot, SaveStateError> {
        let mapper_state = self
            .console
            .bus
            .cartridge
            .mapper()
            .save_state()
            .map_err(|err| SaveStateError::MapperState(format!("{err:#}")))?;
        Ok(Snapshot {
            mapper_id: self.mapper_id(),
            timing: *self.clock.state(),
            cpu: ClockedComponent::state(&self.console.cpu),
            ppu: ClockedComponent::state(&self.console.bus.ppu),
            memory: self.console.bus.memory_state(),
            apu: ClockedComponent::state(&self.console.bus.apu),
            mapper_state,
        })
    }

    pub fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        Ok(self.snapshot()?.encode())
    }

    /// Restores a blob from [`Nes::save_state`]. On error nothing changes.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let result = Snapshot::decode(bytes).and_then(|snapshot| self.restore(snapshot));
        if let Err(err) = &result {
            log::warn!("rejected save state: {err}");
        }
        result
    }

    pub fn restore(&mut self, snapshot: Snapshot) -> Result<(), SaveStateError> {
        let mapper_id = self.mapper_id();
        if snapshot.mapper_id != mapper_id {
            return Err(SaveStateError::MapperMismatch {
                expected: mapper_id,
                found: snapshot.mapper_id,
            });
        }
        let cartridge = &self.console.bus.cartridge;
        if snapshot.memory.prg_ram.len() != cartridge.prg_ram().len()
            || snapshot.memory.chr_ram.len() != cartridge.chr_ram().len()
        {
            return Err(SaveStateError::Layout(format!(
                "cartridge RAM sizes {}/{} do not match {}/{}",
                snapshot.memory.prg_ram.len(),
                snapshot.memory.chr_ram.len(),
                cartridge.prg_ram().len(),
                cartridge.chr_ram().len()
            )));
        }
        // The only fallible step; it either replaces the registers or leaves them.
        self.console
            .bus
            .cartridge
            .mapper_mut()
            .load_state(&snapshot.mapper_state)
            .map_err(|err| SaveStateError::MapperState(format!("{err:#}")))?;

        self.clock.set_state(snapshot.timing);
        self.config.timing_mode = snapshot.timing.mode;
        let bus = &mut self.console.bus;
        bus.ppu.set_pal_timing(snapshot.timing.mode == TimingMode::Pal);
        <Ppu as ClockedComponent>::set_state(&mut bus.ppu, snapshot.ppu);
        <Apu as ClockedComponent>::set_state(&mut bus.apu, snapshot.apu);
        bus.set_memory_state(&snapshot.memory);
        <Cpu as ClockedComponent>::set_state(&mut self.console.cpu, snapshot.cpu);

        let master_cycle = self.clock.master_cycle();
        log::info!("save state loaded at master cycle {master_cycle}");
        self.console
            .push_debug_event(format!("save state loaded at master cycle {master_cycle}"));
        Ok(())
    }
}
