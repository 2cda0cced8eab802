use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

use super::mapper::{CartridgeLayout, Mirroring, is_supported, mapper_name};

pub const INES_HEADER_LEN: usize = 16;
const TRAINER_LEN: usize = 512;
const PRG_UNIT: usize = 16 * 1024;
const CHR_UNIT: usize = 8 * 1024;
const PRG_RAM_UNIT: usize = 8 * 1024;

/// A validated iNES image, split into its stores.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub mapper_id: u16,
    pub mirroring: Mirroring,
    pub has_battery_backed_ram: bool,
    pub prg_rom: Vec<u8>,
    pub chr_data: Vec<u8>,
    pub chr_is_ram: bool,
    pub prg_ram_size: usize,
}

impl Cartridge {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read ROM: {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("invalid ROM: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < INES_HEADER_LEN {
            bail!("ROM is too small to contain an iNES header");
        }
        if &bytes[0..4] != b"NES\x1A" {
            bail!("invalid iNES header magic, expected NES<EOF>");
        }

        let flags6 = bytes[6];
        let flags7 = bytes[7];
        let mapper_id = ((flags6 as u16) >> 4) | ((flags7 as u16) & 0xF0);
        if !is_supported(mapper_id) {
            bail!("unsupported mapper {mapper_id}");
        }

        let mirroring = if (flags6 & 0x08) != 0 {
            Mirroring::FourScreen
        } else if (flags6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };
        let trainer_present = (flags6 & 0x04) != 0;
        let has_battery_backed_ram = (flags6 & 0x02) != 0;

        let prg_rom_size = bytes[4] as usize * PRG_UNIT;
        let chr_rom_size = bytes[5] as usize * CHR_UNIT;
        let prg_ram_size = bytes[8].max(1) as usize * PRG_RAM_UNIT;
        if prg_rom_size == 0 {
            bail!("header declares no PRG ROM");
        }

        let prg_start = INES_HEADER_LEN + if trainer_present { TRAINER_LEN } else { 0 };
        let expected_len = prg_start + prg_rom_size + chr_rom_size;
        if bytes.len() < expected_len {
            bail!(
                "ROM truncated: header declares {} PRG + {} CHR bytes ({} total) but file is {} bytes",
                prg_rom_size,
                chr_rom_size,
                expected_len,
                bytes.len()
            );
        }

        let prg_end = prg_start + prg_rom_size;
        let prg_rom = bytes[prg_start..prg_end].to_vec();
        let (chr_data, chr_is_ram) = if chr_rom_size == 0 {
            (vec![0; CHR_UNIT], true)
        } else {
            (bytes[prg_end..prg_end + chr_rom_size].to_vec(), false)
        };

        Ok(Self {
            mapper_id,
            mirroring,
            has_battery_backed_ram,
            prg_rom,
            chr_data,
            chr_is_ram,
            prg_ram_size,
        })
    }

    pub fn mapper_name(&self) -> &'static str {
        mapper_name(self.mapper_id)
    }

    pub fn layout(&self) -> CartridgeLayout {
        CartridgeLayout {
            prg_rom_len: self.prg_rom.len(),
            chr_len: self.chr_data.len(),
            chr_is_ram: self.chr_is_ram,
            prg_ram_len: self.prg_ram_size,
            mirroring: self.mirroring,
        }
    }
}
