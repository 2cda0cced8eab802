#![allow(dead_code)]

use lockstep_nes::nes::Nes;
use lockstep_nes::nes::config::NesConfig;

pub const PRG_BANK: usize = 0x4000;
pub const CHR_BANK: usize = 0x2000;
/// Start of the last PRG bank, where code and vectors live.
pub const CODE_ORIGIN: u16 = 0xC000;
pub const NMI_HANDLER: u16 = 0xC100;
pub const IRQ_HANDLER: u16 = 0xC180;

/// In-memory iNES image builder.
pub struct RomBuilder {
    mapper: u8,
    prg: Vec<u8>,
    chr_banks: u8,
    vertical_mirroring: bool,
}

impl RomBuilder {
    /// `prg_banks` 16 KB banks of NOPs, each starting with its own index.
    pub fn new(mapper: u8, prg_banks: usize) -> Self {
        let mut prg = vec![0xEA; prg_banks * PRG_BANK];
        for bank in 0..prg_banks {
            prg[bank * PRG_BANK] = bank as u8;
        }
        let mut rom = Self {
            mapper,
            prg,
            chr_banks: 1,
            vertical_mirroring: true,
        };
        // RTI in both handlers by default.
        rom.put(NMI_HANDLER, &[0x40]);
        rom.put(IRQ_HANDLER, &[0x40]);
        rom.vector(0xFFFA, NMI_HANDLER)
            .vector(0xFFFC, CODE_ORIGIN)
            .vector(0xFFFE, IRQ_HANDLER)
    }

    pub fn nrom() -> Self {
        Self::new(0, 1)
    }

    /// Writes `bytes` at a CPU address inside the last bank.
    pub fn put(&mut self, addr: u16, bytes: &[u8]) -> &mut Self {
        let base = self.prg.len() - PRG_BANK + usize::from(addr - CODE_ORIGIN);
        self.prg[base..base + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn code(mut self, bytes: &[u8]) -> Self {
        self.put(CODE_ORIGIN, bytes);
        self
    }

    pub fn nmi_handler(mut self, bytes: &[u8]) -> Self {
        self.put(NMI_HANDLER, bytes);
        self
    }

    pub fn vector(mut self, at: u16, target: u16) -> Self {
        self.put(at, &target.to_le_bytes());
        self
    }

    pub fn chr_ram(mut self) -> Self {
        self.chr_banks = 0;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let flags6 = (self.mapper << 4) | u8::from(self.vertical_mirroring);
        let flags7 = self.mapper & 0xF0;
        let mut image = vec![
            b'N',
            b'E',
            b'S',
            0x1A,
            (self.prg.len() / PRG_BANK) as u8,
            self.chr_banks,
            flags6,
            flags7,
        ];
        image.resize(16, 0);
        image.extend_from_slice(&self.prg);
        image.resize(image.len() + usize::from(self.chr_banks) * CHR_BANK, 0);
        image
    }

    pub fn boot(&self) -> Nes {
        Nes::from_rom_bytes(&self.build(), NesConfig::default()).unwrap()
    }
}

/// NROM that runs `program` from $C000 after reset.
pub fn boot(program: &[u8]) -> Nes {
    RomBuilder::nrom().code(program).boot()
}

/// `JMP $C000`
pub const SPIN: [u8; 3] = [0x4C, 0x00, 0xC0];
