use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    OneScreenLower,
    OneScreenUpper,
    FourScreen,
}

/// Which cartridge store a mapped address lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    PrgRom,
    PrgRam,
    ChrRom,
    ChrRam,
    /// Nothing drives the bus; reads see open bus, writes are dropped.
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedAddress {
    pub offset: usize,
    pub kind: MemoryKind,
}

impl MappedAddress {
    pub const UNMAPPED: Self = Self {
        offset: 0,
        kind: MemoryKind::Unmapped,
    };
}

/// Sizes of the cartridge stores, fixed at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartridgeLayout {
    pub prg_rom_len: usize,
    pub chr_len: usize,
    pub chr_is_ram: bool,
    pub prg_ram_len: usize,
    pub mirroring: Mirroring,
}

impl CartridgeLayout {
    fn prg_rom(&self, offset: usize) -> MappedAddress {
        MappedAddress {
            offset: offset % self.prg_rom_len.max(1),
            kind: MemoryKind::PrgRom,
        }
    }

    fn prg_ram(&self, addr: u16) -> MappedAddress {
        if self.prg_ram_len == 0 {
            return MappedAddress::UNMAPPED;
        }
        MappedAddress {
            offset: (addr as usize - 0x6000) % self.prg_ram_len,
            kind: MemoryKind::PrgRam,
        }
    }

    fn chr(&self, offset: usize) -> MappedAddress {
        MappedAddress {
            offset: offset % self.chr_len.max(1),
            kind: if self.chr_is_ram {
                MemoryKind::ChrRam
            } else {
                MemoryKind::ChrRom
            },
        }
    }

    fn prg_banks(&self, bank_size: usize) -> usize {
        (self.prg_rom_len / bank_size).max(1)
    }

    fn chr_banks(&self, bank_size: usize) -> usize {
        (self.chr_len / bank_size).max(1)
    }
}

/// Cartridge bank-switching logic.
///
/// A mapper never owns the ROM/RAM bytes; it only translates addresses into
/// offsets within the stores described by its [`CartridgeLayout`]. Every
/// returned offset must be in range for that store.
pub trait Mapper {
    fn id(&self) -> u16;
    fn map_cpu_address(&self, addr: u16) -> MappedAddress;
    fn map_ppu_address(&self, addr: u16) -> MappedAddress;
    /// Sees every CPU write to $4020-$FFFF.
    fn write_register(&mut self, addr: u16, value: u8);
    fn reset(&mut self);
    fn mirroring(&self) -> Mirroring;
    /// Called once per rendered scanline while rendering is enabled.
    fn notify_scanline(&mut self) {}
    fn irq_pending(&self) -> bool {
        false
    }
    fn save_state(&self) -> Result<Vec<u8>>;
    fn load_state(&mut self, bytes: &[u8]) -> Result<()>;
    fn debug_state(&self) -> String {
        String::new()
    }
}

pub fn mapper_name(mapper_id: u16) -> &'static str {
    match mapper_id {
        0 => "NROM",
        1 => "MMC1",
        2 => "UxROM",
        3 => "CNROM",
        4 => "MMC3",
        7 => "AxROM",
        _ => "Unsupported",
    }
}

pub fn is_supported(mapper_id: u16) -> bool {
    matches!(mapper_id, 0 | 1 | 2 | 3 | 4 | 7)
}

pub fn create_mapper(mapper_id: u16, layout: CartridgeLayout) -> Result<Box<dyn Mapper>> {
    let mapper: Box<dyn Mapper> = match mapper_id {
        0 => Box::new(Nrom::new(layout)),
        1 => Box::new(Mmc1::new(layout)),
        2 => Box::new(UxRom::new(layout)),
        3 => Box::new(CnRom::new(layout)),
        4 => Box::new(Mmc3::new(layout)),
        7 => Box::new(AxRom::new(layout)),
        id => bail!("unsupported mapper {id}"),
    };
    Ok(mapper)
}

fn encode_registers<T: Serialize>(registers: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(registers).context("failed to encode mapper registers")
}

fn decode_registers<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).context("failed to decode mapper registers")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct NoRegisters {}

struct Nrom {
    layout: CartridgeLayout,
}

impl Nrom {
    fn new(layout: CartridgeLayout) -> Self {
        Self { layout }
    }
}

impl Mapper for Nrom {
    fn id(&self) -> u16 {
        0
    }

    fn map_cpu_address(&self, addr: u16) -> MappedAddress {
        match addr {
            0x6000..=0x7FFF => self.layout.prg_ram(addr),
            // NROM-128 mirrors its single 16 KB bank into $C000.
            0x8000..=0xFFFF => self.layout.prg_rom(addr as usize - 0x8000),
            _ => MappedAddress::UNMAPPED,
        }
    }

    fn map_ppu_address(&self, addr: u16) -> MappedAddress {
        self.layout.chr(addr as usize & 0x1FFF)
    }

    fn write_register(&mut self, _addr: u16, _value: u8) {}

    fn reset(&mut self) {}

    fn mirroring(&self) -> Mirroring {
        self.layout.mirroring
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_registers(&NoRegisters {})
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        let _: NoRegisters = decode_registers(bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Mmc1Registers {
    shift_register: u8,
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,
}

impl Default for Mmc1Registers {
    fn default() -> Self {
        Self {
            shift_register: 0x10,
            control: 0x0C,
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
        }
    }
}

struct Mmc1 {
    layout: CartridgeLayout,
    regs: Mmc1Registers,
}

impl Mmc1 {
    fn new(layout: CartridgeLayout) -> Self {
        Self {
            layout,
            regs: Mmc1Registers::default(),
        }
    }

    fn write_shift_register(&mut self, addr: u16, value: u8) {
        if (value & 0x80) != 0 {
            self.regs.shift_register = 0x10;
            self.regs.control |= 0x0C;
            return;
        }

        let full = (self.regs.shift_register & 0x01) != 0;
        self.regs.shift_register = (self.regs.shift_register >> 1) | ((value & 0x01) << 4);

        if full {
            let data = self.regs.shift_register;
            match addr {
                0x8000..=0x9FFF => self.regs.control = data,
                0xA000..=0xBFFF => self.regs.chr_bank0 = data,
                0xC000..=0xDFFF => self.regs.chr_bank1 = data,
                _ => self.regs.prg_bank = data & 0x0F,
            }
            self.regs.shift_register = 0x10;
        }
    }
}

impl Mapper for Mmc1 {
    fn id(&self) -> u16 {
        1
    }

    fn map_cpu_address(&self, addr: u16) -> MappedAddress {
        match addr {
            0x6000..=0x7FFF => self.layout.prg_ram(addr),
            0x8000..=0xFFFF => {
                let banks = self.layout.prg_banks(0x4000);
                let bank = self.regs.prg_bank as usize;
                let offset = addr as usize & 0x3FFF;
                let bank = match (self.regs.control >> 2) & 0x03 {
                    0 | 1 => (bank & !1) + usize::from(addr >= 0xC000),
                    2 if addr < 0xC000 => 0,
                    2 => bank,
                    _ if addr < 0xC000 => bank,
                    _ => banks - 1,
                };
                self.layout.prg_rom((bank % banks) * 0x4000 + offset)
            }
            _ => MappedAddress::UNMAPPED,
        }
    }

    fn map_ppu_address(&self, addr: u16) -> MappedAddress {
        let addr = addr as usize & 0x1FFF;
        let banks = self.layout.chr_banks(0x1000);
        let (bank, offset) = if (self.regs.control & 0x10) == 0 {
            ((self.regs.chr_bank0 as usize & 0x1E) + (addr >> 12), addr & 0x0FFF)
        } else if addr < 0x1000 {
            (self.regs.chr_bank0 as usize, addr)
        } else {
            (self.regs.chr_bank1 as usize, addr - 0x1000)
        };
        self.layout.chr((bank % banks) * 0x1000 + offset)
    }

    fn write_register(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.write_shift_register(addr, value);
        }
    }

    fn reset(&mut self) {
        self.regs = Mmc1Registers::default();
    }

    fn mirroring(&self) -> Mirroring {
        match self.regs.control & 0x03 {
            0 => Mirroring::OneScreenLower,
            1 => Mirroring::OneScreenUpper,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        }
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_registers(&self.regs)
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.regs = decode_registers(bytes)?;
        Ok(())
    }

    fn debug_state(&self) -> String {
        format!(
            "MMC1 control=${:02X} chr0=${:02X} chr1=${:02X} prg=${:02X} shift=${:02X}",
            self.regs.control,
            self.regs.chr_bank0,
            self.regs.chr_bank1,
            self.regs.prg_bank,
            self.regs.shift_register
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct BankSelect {
    bank: u8,
}

struct UxRom {
    layout: CartridgeLayout,
    regs: BankSelect,
}

impl UxRom {
    fn new(layout: CartridgeLayout) -> Self {
        Self {
            layout,
            regs: BankSelect::default(),
        }
    }
}

impl Mapper for UxRom {
    fn id(&self) -> u16 {
        2
    }

    fn map_cpu_address(&self, addr: u16) -> MappedAddress {
        let banks = self.layout.prg_banks(0x4000);
        match addr {
            0x6000..=0x7FFF => self.layout.prg_ram(addr),
            0x8000..=0xBFFF => {
                let bank = self.regs.bank as usize % banks;
                self.layout.prg_rom(bank * 0x4000 + (addr as usize - 0x8000))
            }
            0xC000..=0xFFFF => self
                .layout
                .prg_rom((banks - 1) * 0x4000 + (addr as usize - 0xC000)),
            _ => MappedAddress::UNMAPPED,
        }
    }

    fn map_ppu_address(&self, addr: u16) -> MappedAddress {
        self.layout.chr(addr as usize & 0x1FFF)
    }

    fn write_register(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.regs.bank = value & 0x0F;
        }
    }

    fn reset(&mut self) {
        self.regs = BankSelect::default();
    }

    fn mirroring(&self) -> Mirroring {
        self.layout.mirroring
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_registers(&self.regs)
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.regs = decode_registers(bytes)?;
        Ok(())
    }

    fn debug_state(&self) -> String {
        format!("UxROM prg_bank=${:02X}", self.regs.bank)
    }
}

struct CnRom {
    layout: CartridgeLayout,
    regs: BankSelect,
}

impl CnRom {
    fn new(layout: CartridgeLayout) -> Self {
        Self {
            layout,
            regs: BankSelect::default(),
        }
    }
}

impl Mapper for CnRom {
    fn id(&self) -> u16 {
        3
    }

    fn map_cpu_address(&self, addr: u16) -> MappedAddress {
        match addr {
            0x6000..=0x7FFF => self.layout.prg_ram(addr),
            0x8000..=0xFFFF => self.layout.prg_rom(addr as usize - 0x8000),
            _ => MappedAddress::UNMAPPED,
        }
    }

    fn map_ppu_address(&self, addr: u16) -> MappedAddress {
        let bank = self.regs.bank as usize % self.layout.chr_banks(0x2000);
        self.layout.chr(bank * 0x2000 + (addr as usize & 0x1FFF))
    }

    fn write_register(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.regs.bank = value;
        }
    }

    fn reset(&mut self) {
        self.regs = BankSelect::default();
    }

    fn mirroring(&self) -> Mirroring {
        self.layout.mirroring
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_registers(&self.regs)
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.regs = decode_registers(bytes)?;
        Ok(())
    }

    fn debug_state(&self) -> String {
        format!("CNROM chr_bank=${:02X}", self.regs.bank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Mmc3Registers {
    bank_select: u8,
    bank_regs: [u8; 8],
    mirroring: Mirroring,
    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
}

impl Mmc3Registers {
    fn power_on(mirroring: Mirroring) -> Self {
        Self {
            bank_select: 0,
            bank_regs: [0, 2, 4, 5, 6, 7, 0, 1],
            mirroring,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
        }
    }
}

struct Mmc3 {
    layout: CartridgeLayout,
    regs: Mmc3Registers,
}

impl Mmc3 {
    fn new(layout: CartridgeLayout) -> Self {
        Self {
            layout,
            regs: Mmc3Registers::power_on(layout.mirroring),
        }
    }

    fn prg_bank_for(&self, addr: u16) -> usize {
        let banks = self.layout.prg_banks(0x2000);
        let swap_low = (self.regs.bank_select & 0x40) != 0;
        let r6 = self.regs.bank_regs[6] as usize;
        match addr {
            0x8000..=0x9FFF if swap_low => banks.saturating_sub(2),
            0x8000..=0x9FFF => r6,
            0xA000..=0xBFFF => self.regs.bank_regs[7] as usize,
            0xC000..=0xDFFF if swap_low => r6,
            0xC000..=0xDFFF => banks.saturating_sub(2),
            _ => banks - 1,
        }
    }

    fn chr_bank_for(&self, addr: usize) -> usize {
        let r = &self.regs.bank_regs;
        let two_k = |reg: u8, half: usize| (reg as usize & 0xFE) + half;
        // With bit 7 set the 2 KB and 1 KB halves trade places.
        let slot = if (self.regs.bank_select & 0x80) != 0 {
            (addr >> 10) ^ 0x04
        } else {
            addr >> 10
        };
        match slot {
            0 | 1 => two_k(r[0], slot & 1),
            2 | 3 => two_k(r[1], slot & 1),
            4 => r[2] as usize,
            5 => r[3] as usize,
            6 => r[4] as usize,
            _ => r[5] as usize,
        }
    }
}

impl Mapper for Mmc3 {
    fn id(&self) -> u16 {
        4
    }

    fn map_cpu_address(&self, addr: u16) -> MappedAddress {
        match addr {
            0x6000..=0x7FFF => self.layout.prg_ram(addr),
            0x8000..=0xFFFF => {
                let bank = self.prg_bank_for(addr) % self.layout.prg_banks(0x2000);
                self.layout
                    .prg_rom(bank * 0x2000 + (addr as usize & 0x1FFF))
            }
            _ => MappedAddress::UNMAPPED,
        }
    }

    fn map_ppu_address(&self, addr: u16) -> MappedAddress {
        let addr = addr as usize & 0x1FFF;
        let bank = self.chr_bank_for(addr) % self.layout.chr_banks(0x0400);
        self.layout.chr(bank * 0x0400 + (addr & 0x03FF))
    }

    fn write_register(&mut self, addr: u16, value: u8) {
        let even = (addr & 1) == 0;
        match addr {
            0x8000..=0x9FFF if even => self.regs.bank_select = value,
            0x8000..=0x9FFF => {
                let target = (self.regs.bank_select & 0x07) as usize;
                self.regs.bank_regs[target] = value;
            }
            0xA000..=0xBFFF if even => {
                if self.layout.mirroring != Mirroring::FourScreen {
                    self.regs.mirroring = if (value & 1) == 0 {
                        Mirroring::Vertical
                    } else {
                        Mirroring::Horizontal
                    };
                }
            }
            0xC000..=0xDFFF if even => self.regs.irq_latch = value,
            0xC000..=0xDFFF => {
                self.regs.irq_counter = 0;
                self.regs.irq_reload = true;
            }
            0xE000..=0xFFFF if even => {
                self.regs.irq_enabled = false;
                self.regs.irq_pending = false;
            }
            0xE000..=0xFFFF => self.regs.irq_enabled = true,
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.regs = Mmc3Registers::power_on(self.layout.mirroring);
    }

    fn mirroring(&self) -> Mirroring {
        if self.layout.mirroring == Mirroring::FourScreen {
            Mirroring::FourScreen
        } else {
            self.regs.mirroring
        }
    }

    fn notify_scanline(&mut self) {
        if self.regs.irq_counter == 0 || self.regs.irq_reload {
            self.regs.irq_counter = self.regs.irq_latch;
            self.regs.irq_reload = false;
        } else {
            self.regs.irq_counter -= 1;
        }

        if self.regs.irq_counter == 0 && self.regs.irq_enabled {
            self.regs.irq_pending = true;
        }
    }

    fn irq_pending(&self) -> bool {
        self.regs.irq_pending
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_registers(&self.regs)
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.regs = decode_registers(bytes)?;
        Ok(())
    }

    fn debug_state(&self) -> String {
        format!(
            "MMC3 select=${:02X} banks={:02X?} latch={} counter={} irq_enabled={} irq_pending={}",
            self.regs.bank_select,
            self.regs.bank_regs,
            self.regs.irq_latch,
            self.regs.irq_counter,
            self.regs.irq_enabled,
            self.regs.irq_pending
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct AxRomRegisters {
    prg_bank: u8,
    mirroring: Mirroring,
}

impl Default for AxRomRegisters {
    fn default() -> Self {
        Self {
            prg_bank: 0,
            mirroring: Mirroring::OneScreenLower,
        }
    }
}

struct AxRom {
    layout: CartridgeLayout,
    regs: AxRomRegisters,
}

impl AxRom {
    fn new(layout: CartridgeLayout) -> Self {
        Self {
            layout,
            regs: AxRomRegisters::default(),
        }
    }
}

impl Mapper for AxRom {
    fn id(&self) -> u16 {
        7
    }

    fn map_cpu_address(&self, addr: u16) -> MappedAddress {
        match addr {
            0x6000..=0x7FFF => self.layout.prg_ram(addr),
            0x8000..=0xFFFF => {
                let bank = self.regs.prg_bank as usize % self.layout.prg_banks(0x8000);
                self.layout.prg_rom(bank * 0x8000 + (addr as usize & 0x7FFF))
            }
            _ => MappedAddress::UNMAPPED,
        }
    }

    fn map_ppu_address(&self, addr: u16) -> MappedAddress {
        self.layout.chr(addr as usize & 0x1FFF)
    }

    fn write_register(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.regs.prg_bank = value & 0x07;
            self.regs.mirroring = if (value & 0x10) != 0 {
                Mirroring::OneScreenUpper
            } else {
                Mirroring::OneScreenLower
            };
        }
    }

    fn reset(&mut self) {
        self.regs = AxRomRegisters::default();
    }

    fn mirroring(&self) -> Mirroring {
        self.regs.mirroring
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_registers(&self.regs)
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.regs = decode_registers(bytes)?;
        Ok(())
    }

    fn debug_state(&self) -> String {
        format!(
            "AxROM prg_bank=${:02X} mirroring={:?}",
            self.regs.prg_bank, self.regs.mirroring
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(prg_kb: usize, chr_kb: usize) -> CartridgeLayout {
        CartridgeLayout {
            prg_rom_len: prg_kb * 1024,
            chr_len: chr_kb.max(8) * 1024,
            chr_is_ram: chr_kb == 0,
            prg_ram_len: 8 * 1024,
            mirroring: Mirroring::Horizontal,
        }
    }

    #[test]
    fn nrom_128_mirrors_upper_bank() {
        let mapper = create_mapper(0, layout(16, 8)).unwrap();
        assert_eq!(mapper.map_cpu_address(0x8005).offset, 5);
        assert_eq!(mapper.map_cpu_address(0xC005).offset, 5);
        assert_eq!(mapper.map_cpu_address(0x6001).kind, MemoryKind::PrgRam);
        assert_eq!(mapper.map_cpu_address(0x5000).kind, MemoryKind::Unmapped);
        assert_eq!(mapper.map_ppu_address(0x1234).kind, MemoryKind::ChrRom);
    }

    #[test]
    fn mmc1_serial_write_switches_prg_bank() {
        let mut mapper = create_mapper(1, layout(128, 0)).unwrap();
        // Power-on mode 3: last bank fixed at $C000.
        assert_eq!(mapper.map_cpu_address(0xC000).offset, 7 * 0x4000);
        for bit in 0..5 {
            mapper.write_register(0xE000, (0x03 >> bit) & 1);
        }
        assert_eq!(mapper.map_cpu_address(0x8000).offset, 3 * 0x4000);
        assert_eq!(mapper.map_ppu_address(0x0010).kind, MemoryKind::ChrRam);

        mapper.write_register(0x8000, 0x80);
        mapper.reset();
        assert_eq!(mapper.map_cpu_address(0x8000).offset, 0);
    }

    #[test]
    fn uxrom_fixes_last_bank() {
        let mut mapper = create_mapper(2, layout(64, 8)).unwrap();
        mapper.write_register(0x8000, 2);
        assert_eq!(mapper.map_cpu_address(0x8000).offset, 2 * 0x4000);
        assert_eq!(mapper.map_cpu_address(0xFFFF).offset, 0xFFFF);
    }

    #[test]
    fn mmc3_irq_fires_after_latch_scanlines() {
        let mut mapper = create_mapper(4, layout(64, 64)).unwrap();
        mapper.write_register(0xC000, 3);
        mapper.write_register(0xC001, 0);
        mapper.write_register(0xE001, 0);

        for _ in 0..3 {
            mapper.notify_scanline();
            assert!(!mapper.irq_pending());
        }
        mapper.notify_scanline();
        assert!(mapper.irq_pending());

        mapper.write_register(0xE000, 0);
        assert!(!mapper.irq_pending());
    }

    #[test]
    fn mmc3_chr_inversion_swaps_halves() {
        let mut mapper = create_mapper(4, layout(64, 64)).unwrap();
        mapper.write_register(0x8000, 0x02);
        mapper.write_register(0x8001, 9);
        assert_eq!(mapper.map_ppu_address(0x1000).offset, 9 * 0x400);
        mapper.write_register(0x8000, 0x82);
        assert_eq!(mapper.map_ppu_address(0x0000).offset, 9 * 0x400);
    }

    #[test]
    fn register_state_survives_save_and_load() {
        let mut mapper = create_mapper(7, layout(128, 8)).unwrap();
        mapper.write_register(0x8000, 0x13);
        let blob = mapper.save_state().unwrap();
        mapper.reset();
        assert_eq!(mapper.mirroring(), Mirroring::OneScreenLower);

        mapper.load_state(&blob).unwrap();
        assert_eq!(mapper.mirroring(), Mirroring::OneScreenUpper);
        assert_eq!(mapper.map_cpu_address(0x8000).offset, 3 * 0x8000);
        assert!(mapper.load_state(b"not json").is_err());
    }

    #[test]
    fn unsupported_mapper_is_rejected() {
        assert!(create_mapper(5, layout(32, 8)).is_err());
        assert!(!is_supported(66));
    }
}
