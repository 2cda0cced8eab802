use anyhow::Result;

use super::NesDebugCounters;
use super::apu::Apu;
use super::cartridge::Cartridge;
use super::cpu::{CpuBus, CpuState};
use super::mapper::{Mapper, MemoryKind, Mirroring, create_mapper};
use super::ppu::{ChrMemory, Ppu, PpuEvent};
use super::trace::TraceHook;

pub const RAM_SIZE: usize = 0x0800;
const OAM_DMA_REGISTER: u16 = 0x4014;
const CONTROLLER_1: u16 = 0x4016;
const CONTROLLER_2: u16 = 0x4017;

/// Where a CPU address lands. Decoding is pure masking; every address maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuRegion {
    /// Index into the 2 KB internal RAM.
    Ram(usize),
    /// One of $2000-$2007.
    PpuRegister(u16),
    /// $4000-$401F.
    ApuIo(u16),
    /// $4020-$FFFF, owned by the mapper.
    Cartridge(u16),
}

impl CpuRegion {
    pub const fn decode(addr: u16) -> Self {
        match addr {
            0x0000..=0x1FFF => CpuRegion::Ram((addr as usize) & (RAM_SIZE - 1)),
            0x2000..=0x3FFF => CpuRegion::PpuRegister(0x2000 | (addr & 0x0007)),
            0x4000..=0x401F => CpuRegion::ApuIo(addr),
            _ => CpuRegion::Cartridge(addr),
        }
    }
}

/// Where a PPU address lands after masking to 14 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpuRegion {
    /// Pattern tables, $0000-$1FFF.
    Chr(u16),
    /// Offset 0..0x1000 into the four logical nametables. $3000-$3EFF mirrors $2000.
    Nametable(u16),
    /// Index into the 32-byte palette RAM.
    Palette(usize),
}

impl PpuRegion {
    pub const fn decode(addr: u16) -> Self {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => PpuRegion::Chr(addr),
            0x2000..=0x3EFF => PpuRegion::Nametable((addr - 0x2000) & 0x0FFF),
            _ => PpuRegion::Palette(palette_index(addr)),
        }
    }
}

/// $3F10/$3F14/$3F18/$3F1C alias the background entries below them.
pub const fn palette_index(addr: u16) -> usize {
    let idx = (addr as usize) & 0x1F;
    if idx >= 0x10 && (idx & 0x03) == 0 {
        idx - 0x10
    } else {
        idx
    }
}

/// Maps a logical nametable offset to an index into the 4 KB VRAM.
pub const fn nametable_index(offset: u16, mirroring: Mirroring) -> usize {
    let offset = (offset as usize) & 0x0FFF;
    let table = offset / 0x0400;
    let mapped = match mirroring {
        Mirroring::Horizontal => table / 2,
        Mirroring::Vertical => table & 1,
        Mirroring::OneScreenLower => 0,
        Mirroring::OneScreenUpper => 1,
        Mirroring::FourScreen => table & 3,
    };
    mapped * 0x0400 + (offset % 0x0400)
}

/// Cartridge stores plus the mapper that addresses them.
pub struct CartridgeSlot {
    mapper: Box<dyn Mapper>,
    prg_rom: Vec<u8>,
    prg_ram: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
}

impl CartridgeSlot {
    pub fn new(cartridge: Cartridge) -> Result<Self> {
        let mapper = create_mapper(cartridge.mapper_id, cartridge.layout())?;
        Ok(Self {
            mapper,
            prg_ram: vec![0; cartridge.prg_ram_size],
            prg_rom: cartridge.prg_rom,
            chr: cartridge.chr_data,
            chr_is_ram: cartridge.chr_is_ram,
        })
    }

    pub fn mapper(&self) -> &dyn Mapper {
        self.mapper.as_ref()
    }

    pub fn mapper_mut(&mut self) -> &mut dyn Mapper {
        self.mapper.as_mut()
    }

    pub fn prg_ram(&self) -> &[u8] {
        &self.prg_ram
    }

    /// CHR-RAM contents, or an empty slice for CHR-ROM carts.
    pub fn chr_ram(&self) -> &[u8] {
        if self.chr_is_ram { &self.chr } else { &[] }
    }

    /// Lengths must match the loaded cartridge.
    pub(crate) fn restore_ram(&mut self, prg_ram: &[u8], chr_ram: &[u8]) {
        debug_assert_eq!(prg_ram.len(), self.prg_ram.len());
        self.prg_ram.copy_from_slice(prg_ram);
        if self.chr_is_ram {
            debug_assert_eq!(chr_ram.len(), self.chr.len());
            self.chr.copy_from_slice(chr_ram);
        }
    }

    pub fn reset(&mut self) {
        self.mapper.reset();
    }

    /// `None` means nothing drives the bus at `addr`.
    pub fn cpu_read(&self, addr: u16) -> Option<u8> {
        let mapped = self.mapper.map_cpu_address(addr);
        match mapped.kind {
            MemoryKind::PrgRom => {
                debug_assert!(mapped.offset < self.prg_rom.len(), "PRG-ROM offset out of range");
                Some(self.prg_rom[mapped.offset])
            }
            MemoryKind::PrgRam => {
                debug_assert!(mapped.offset < self.prg_ram.len(), "PRG-RAM offset out of range");
                Some(self.prg_ram[mapped.offset])
            }
            _ => None,
        }
    }

    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        let mapped = self.mapper.map_cpu_address(addr);
        if mapped.kind == MemoryKind::PrgRam {
            debug_assert!(mapped.offset < self.prg_ram.len(), "PRG-RAM offset out of range");
            self.prg_ram[mapped.offset] = value;
        }
        self.mapper.write_register(addr, value);
    }
}

impl ChrMemory for CartridgeSlot {
    fn read_chr(&self, addr: u16) -> u8 {
        let mapped = self.mapper.map_ppu_address(addr);
        match mapped.kind {
            MemoryKind::ChrRom | MemoryKind::ChrRam => {
                debug_assert!(mapped.offset < self.chr.len(), "CHR offset out of range");
                self.chr[mapped.offset]
            }
            _ => 0,
        }
    }

    fn write_chr(&mut self, addr: u16, value: u8) {
        let mapped = self.mapper.map_ppu_address(addr);
        if mapped.kind == MemoryKind::ChrRam {
            debug_assert!(mapped.offset < self.chr.len(), "CHR offset out of range");
            self.chr[mapped.offset] = value;
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.mapper.mirroring()
    }

    fn notify_scanline(&mut self) {
        self.mapper.notify_scanline();
    }
}

/// A standard pad: latched buttons and the serial shift register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerPort {
    pub buttons: u8,
    pub shift: u8,
}

impl ControllerPort {
    fn read(&mut self, strobe: bool) -> u8 {
        let bit = if strobe {
            self.buttons & 0x01
        } else {
            let out = self.shift & 0x01;
            self.shift = (self.shift >> 1) | 0x80;
            out
        };
        0x40 | bit
    }
}

/// Bus-owned memory and IO latches captured by save states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryState {
    pub ram: [u8; RAM_SIZE],
    pub controllers: [ControllerPort; 2],
    pub strobe: bool,
    pub open_bus: u8,
    pub prg_ram: Vec<u8>,
    pub chr_ram: Vec<u8>,
}

pub struct Bus {
    ram: [u8; RAM_SIZE],
    pub(crate) ppu: Ppu,
    pub(crate) apu: Apu,
    pub(crate) cartridge: CartridgeSlot,
    controllers: [ControllerPort; 2],
    strobe: bool,
    open_bus: u8,
    dma_request: bool,
    trace: Option<Box<dyn TraceHook>>,
    pub(crate) debug: NesDebugCounters,
}

impl Bus {
    pub fn new(cartridge: CartridgeSlot) -> Self {
        Self {
            ram: [0; RAM_SIZE],
            ppu: Ppu::new(),
            apu: Apu::new(),
            cartridge,
            controllers: [ControllerPort::default(); 2],
            strobe: false,
            open_bus: 0,
            dma_request: false,
            trace: None,
            debug: NesDebugCounters::default(),
        }
    }

    /// Power-on state for everything on the bus. PRG-RAM and CHR-RAM persist.
    pub fn reset(&mut self) {
        self.ram = [0; RAM_SIZE];
        self.ppu.reset();
        self.apu.reset();
        self.cartridge.reset();
        self.controllers = [ControllerPort::default(); 2];
        self.strobe = false;
        self.open_bus = 0;
        self.dma_request = false;
        self.debug = NesDebugCounters::default();
    }

    pub fn set_trace_hook(&mut self, hook: Option<Box<dyn TraceHook>>) -> Option<Box<dyn TraceHook>> {
        std::mem::replace(&mut self.trace, hook)
    }

    pub fn set_controller_state(&mut self, port: usize, buttons: u8) {
        let Some(pad) = self.controllers.get_mut(port) else {
            return;
        };
        pad.buttons = buttons;
        if self.strobe {
            pad.shift = buttons;
        }
    }

    pub fn controller_state(&self, port: usize) -> u8 {
        self.controllers.get(port).map_or(0, |pad| pad.buttons)
    }

    /// IRQ level: APU frame IRQ or mapper IRQ.
    pub fn irq_line(&self) -> bool {
        self.apu.irq_pending() || self.cartridge.mapper().irq_pending()
    }

    pub fn tick_ppu(&mut self) -> PpuEvent {
        self.debug.ppu_cycles = self.debug.ppu_cycles.wrapping_add(1);
        self.ppu.execute_cycle(&mut self.cartridge)
    }

    pub fn tick_apu(&mut self) -> bool {
        self.debug.apu_ticks = self.debug.apu_ticks.wrapping_add(1);
        self.apu.execute_cycle()
    }

    /// CPU-space read without side effects, for debuggers.
    pub fn peek(&self, addr: u16) -> u8 {
        match CpuRegion::decode(addr) {
            CpuRegion::Ram(idx) => self.ram[idx],
            CpuRegion::PpuRegister(_) => self.ppu.state().open_bus,
            CpuRegion::ApuIo(0x4015) => self.apu.peek_status(),
            CpuRegion::ApuIo(_) => self.open_bus,
            CpuRegion::Cartridge(addr) => self.cartridge.cpu_read(addr).unwrap_or(self.open_bus),
        }
    }

    pub fn peek_ppu(&self, addr: u16) -> u8 {
        self.ppu.peek_vram(addr, &self.cartridge)
    }

    pub fn render_background(&self) -> Vec<u8> {
        self.ppu.render_background(&self.cartridge)
    }

    pub fn memory_state(&self) -> MemoryState {
        MemoryState {
            ram: self.ram,
            controllers: self.controllers,
            strobe: self.strobe,
            open_bus: self.open_bus,
            prg_ram: self.cartridge.prg_ram().to_vec(),
            chr_ram: self.cartridge.chr_ram().to_vec(),
        }
    }

    pub(crate) fn set_memory_state(&mut self, state: &MemoryState) {
        self.ram = state.ram;
        self.controllers = state.controllers;
        self.strobe = state.strobe;
        self.open_bus = state.open_bus;
        self.dma_request = false;
        self.cartridge.restore_ram(&state.prg_ram, &state.chr_ram);
    }

    fn read_apu_io(&mut self, addr: u16) -> u8 {
        match addr {
            0x4015 => self.apu.read_status() | (self.open_bus & 0x20),
            CONTROLLER_1 => self.controllers[0].read(self.strobe),
            CONTROLLER_2 => self.controllers[1].read(self.strobe),
            _ => self.open_bus,
        }
    }

    fn write_apu_io(&mut self, addr: u16, value: u8) {
        match addr {
            OAM_DMA_REGISTER => self.oam_dma(value),
            CONTROLLER_1 => {
                self.strobe = (value & 0x01) != 0;
                if self.strobe {
                    for pad in &mut self.controllers {
                        pad.shift = pad.buttons;
                    }
                }
            }
            0x4000..=0x4013 | 0x4015 | CONTROLLER_2 => self.apu.write_register(addr, value),
            _ => {}
        }
    }

    fn oam_dma(&mut self, page: u8) {
        self.debug.dma_transfers = self.debug.dma_transfers.wrapping_add(1);
        let base = (page as u16) << 8;
        let mut bytes = [0u8; 256];
        for (idx, slot) in bytes.iter_mut().enumerate() {
            *slot = self.read(base | idx as u16);
        }
        self.ppu.write_oam_dma(&bytes);
        self.dma_request = true;
    }

    fn trace_register(&mut self, addr: u16, value: u8, is_write: bool) {
        if let Some(hook) = self.trace.as_mut() {
            hook.on_register_access(addr, value, is_write);
        }
    }
}

impl CpuBus for Bus {
    fn read(&mut self, addr: u16) -> u8 {
        self.debug.cpu_reads = self.debug.cpu_reads.wrapping_add(1);
        self.debug.last_cpu_read_addr = addr;
        let value = match CpuRegion::decode(addr) {
            CpuRegion::Ram(idx) => {
                self.debug.cpu_reads_ram = self.debug.cpu_reads_ram.wrapping_add(1);
                self.ram[idx]
            }
            CpuRegion::PpuRegister(reg) => {
                self.debug.cpu_reads_ppu_regs = self.debug.cpu_reads_ppu_regs.wrapping_add(1);
                let value = self.ppu.read_register(reg, &mut self.cartridge);
                self.trace_register(addr, value, false);
                value
            }
            CpuRegion::ApuIo(addr) => {
                self.debug.cpu_reads_apu_io = self.debug.cpu_reads_apu_io.wrapping_add(1);
                let value = self.read_apu_io(addr);
                self.trace_register(addr, value, false);
                value
            }
            CpuRegion::Cartridge(addr) => {
                self.debug.cpu_reads_cart = self.debug.cpu_reads_cart.wrapping_add(1);
                self.cartridge.cpu_read(addr).unwrap_or(self.open_bus)
            }
        };
        self.open_bus = value;
        value
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.debug.cpu_writes = self.debug.cpu_writes.wrapping_add(1);
        self.debug.last_cpu_write_addr = addr;
        self.debug.last_cpu_write_value = value;
        self.open_bus = value;
        match CpuRegion::decode(addr) {
            CpuRegion::Ram(idx) => {
                self.debug.cpu_writes_ram = self.debug.cpu_writes_ram.wrapping_add(1);
                self.ram[idx] = value;
            }
            CpuRegion::PpuRegister(reg) => {
                self.debug.cpu_writes_ppu_regs = self.debug.cpu_writes_ppu_regs.wrapping_add(1);
                self.ppu.write_register(reg, value, &mut self.cartridge);
                self.trace_register(addr, value, true);
            }
            CpuRegion::ApuIo(addr) => {
                self.debug.cpu_writes_apu_io = self.debug.cpu_writes_apu_io.wrapping_add(1);
                self.write_apu_io(addr, value);
                self.trace_register(addr, value, true);
            }
            CpuRegion::Cartridge(addr) => {
                self.debug.cpu_writes_cart = self.debug.cpu_writes_cart.wrapping_add(1);
                self.cartridge.cpu_write(addr, value);
            }
        }
    }

    fn take_dma_request(&mut self) -> bool {
        std::mem::take(&mut self.dma_request)
    }

    fn on_instruction_fetched(&mut self, pc: u16, opcode: u8, state: &CpuState) {
        if let Some(hook) = self.trace.as_mut() {
            hook.on_instruction_fetched(pc, opcode, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::trace::TraceRecorder;

    fn nrom_slot(mirroring_flags: u8, chr_banks: u8) -> CartridgeSlot {
        let mut image = vec![b'N', b'E', b'S', 0x1A, 1, chr_banks, mirroring_flags, 0];
        image.resize(16, 0);
        let mut prg = vec![0u8; 0x4000];
        prg[0x0000] = 0x11;
        prg[0x3FFF] = 0x22;
        image.extend_from_slice(&prg);
        image.resize(image.len() + chr_banks as usize * 0x2000, 0x33);
        let cart = Cartridge::from_bytes(&image).unwrap();
        CartridgeSlot::new(cart).unwrap()
    }

    #[test]
    fn cpu_decode_mirrors_ram_and_ppu_registers() {
        assert_eq!(CpuRegion::decode(0x0000), CpuRegion::Ram(0));
        assert_eq!(CpuRegion::decode(0x0801), CpuRegion::Ram(1));
        assert_eq!(CpuRegion::decode(0x1FFF), CpuRegion::Ram(0x7FF));
        assert_eq!(CpuRegion::decode(0x2008), CpuRegion::PpuRegister(0x2000));
        assert_eq!(CpuRegion::decode(0x3FFF), CpuRegion::PpuRegister(0x2007));
        assert_eq!(CpuRegion::decode(0x4014), CpuRegion::ApuIo(0x4014));
        assert_eq!(CpuRegion::decode(0x401F), CpuRegion::ApuIo(0x401F));
        assert_eq!(CpuRegion::decode(0x4020), CpuRegion::Cartridge(0x4020));
    }

    #[test]
    fn ppu_decode_covers_whole_space() {
        assert_eq!(PpuRegion::decode(0x1FFF), PpuRegion::Chr(0x1FFF));
        assert_eq!(PpuRegion::decode(0x2400), PpuRegion::Nametable(0x0400));
        assert_eq!(PpuRegion::decode(0x3000), PpuRegion::Nametable(0x0000));
        assert_eq!(PpuRegion::decode(0x3F10), PpuRegion::Palette(0x00));
        assert_eq!(PpuRegion::decode(0x3F11), PpuRegion::Palette(0x11));
        assert_eq!(PpuRegion::decode(0x3FFF), PpuRegion::Palette(0x1F));
        assert_eq!(PpuRegion::decode(0x7F00), PpuRegion::Palette(0x00));
    }

    #[test]
    fn nametable_mirroring_modes() {
        assert_eq!(nametable_index(0x0400, Mirroring::Horizontal), 0x0000);
        assert_eq!(nametable_index(0x0800, Mirroring::Horizontal), 0x0400);
        assert_eq!(nametable_index(0x0800, Mirroring::Vertical), 0x0000);
        assert_eq!(nametable_index(0x0C05, Mirroring::Vertical), 0x0405);
        assert_eq!(nametable_index(0x0C05, Mirroring::OneScreenLower), 0x0005);
        assert_eq!(nametable_index(0x0005, Mirroring::OneScreenUpper), 0x0405);
        assert_eq!(nametable_index(0x0C05, Mirroring::FourScreen), 0x0C05);
    }

    #[test]
    fn ram_mirrors_and_cartridge_reads() {
        let mut bus = Bus::new(nrom_slot(0, 1));
        bus.write(0x0002, 0xAB);
        assert_eq!(bus.read(0x1002), 0xAB);
        assert_eq!(bus.read(0x8000), 0x11);
        assert_eq!(bus.read(0xC000), 0x11);
        assert_eq!(bus.read(0xFFFF), 0x22);

        bus.write(0x6001, 0x5A);
        assert_eq!(bus.read(0x6001), 0x5A);
        assert_eq!(bus.debug.cpu_writes_ram, 1);
        assert_eq!(bus.debug.cpu_writes_cart, 1);
    }

    #[test]
    fn unmapped_cartridge_space_reads_open_bus() {
        let mut bus = Bus::new(nrom_slot(0, 1));
        bus.read(0x8000);
        assert_eq!(bus.read(0x5000), 0x11);
    }

    #[test]
    fn controller_shift_protocol() {
        let mut bus = Bus::new(nrom_slot(0, 1));
        bus.set_controller_state(0, 0b0000_0101);
        bus.write(0x4016, 1);
        bus.write(0x4016, 0);

        let bits: Vec<u8> = (0..8).map(|_| bus.read(0x4016) & 0x01).collect();
        assert_eq!(bits, vec![1, 0, 1, 0, 0, 0, 0, 0]);
        assert_eq!(bus.read(0x4016), 0x41);
        assert_eq!(bus.read(0x4017), 0x40);
    }

    #[test]
    fn oam_dma_copies_page_and_requests_stall() {
        let mut bus = Bus::new(nrom_slot(0, 1));
        for i in 0..256u16 {
            bus.write(0x0200 + i, i as u8);
        }
        bus.write(0x4014, 0x02);
        assert!(bus.take_dma_request());
        assert!(!bus.take_dma_request());
        assert_eq!(bus.ppu.state().oam[0x00], 0x00);
        assert_eq!(bus.ppu.state().oam[0xFF], 0xFF);
        assert_eq!(bus.debug.dma_transfers, 1);
    }

    #[test]
    fn chr_rom_ignores_writes_chr_ram_keeps_them() {
        let mut rom = nrom_slot(0, 1);
        rom.write_chr(0x0010, 0x99);
        assert_eq!(rom.read_chr(0x0010), 0x33);

        let mut ram = nrom_slot(0, 0);
        ram.write_chr(0x0010, 0x99);
        assert_eq!(ram.read_chr(0x0010), 0x99);
        assert_eq!(ram.chr_ram().len(), 0x2000);
        assert!(rom.chr_ram().is_empty());
    }

    #[test]
    fn trace_hook_sees_register_traffic() {
        let mut bus = Bus::new(nrom_slot(0, 1));
        let recorder = TraceRecorder::new(16).with_register_access(true);
        bus.set_trace_hook(Some(Box::new(recorder.clone())));

        bus.write(0x0000, 1);
        bus.write(0x2001, 0x1E);
        bus.read(0x4016);
        assert_eq!(
            recorder.lines(),
            vec!["      W $2001 = $1E".to_string(), "      R $4016 = $40".to_string()]
        );
    }

    #[test]
    fn reset_clears_ram_but_keeps_prg_ram() {
        let mut bus = Bus::new(nrom_slot(0, 1));
        bus.write(0x0010, 0x42);
        bus.write(0x6000, 0x24);
        bus.reset();
        assert_eq!(bus.peek(0x0010), 0x00);
        assert_eq!(bus.peek(0x6000), 0x24);
    }
}
