use super::bus::{PpuRegion, nametable_index};
use super::clock::ClockedComponent;
use super::mapper::Mirroring;

pub const FRAME_WIDTH: usize = 256;
pub const FRAME_HEIGHT: usize = 240;

pub const VBLANK_SCANLINE: u16 = 241;
pub const NTSC_PRE_RENDER_SCANLINE: u16 = 261;
pub const PAL_PRE_RENDER_SCANLINE: u16 = 311;
pub const LAST_CYCLE: u16 = 340;
const MMC3_CLOCK_CYCLE: u16 = 260;

pub const CTRL_NMI_ENABLE: u8 = 0x80;
const CTRL_SPRITE_SIZE_16: u8 = 0x20;
const CTRL_BG_TABLE: u8 = 0x10;
const CTRL_SPRITE_TABLE: u8 = 0x08;
const CTRL_VRAM_INC_32: u8 = 0x04;

const MASK_SHOW_BG_LEFT: u8 = 0x02;
const MASK_SHOW_SPRITE_LEFT: u8 = 0x04;
pub const MASK_SHOW_BG: u8 = 0x08;
pub const MASK_SHOW_SPRITES: u8 = 0x10;

pub const STATUS_SPRITE_OVERFLOW: u8 = 0x20;
pub const STATUS_SPRITE_ZERO_HIT: u8 = 0x40;
pub const STATUS_VBLANK: u8 = 0x80;

/// The PPU's window onto cartridge pattern memory and mirroring.
pub trait ChrMemory {
    fn read_chr(&self, addr: u16) -> u8;
    fn write_chr(&mut self, addr: u16, value: u8);
    fn mirroring(&self) -> Mirroring;
    fn notify_scanline(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpuState {
    pub ctrl: u8,
    pub mask: u8,
    pub status: u8,
    pub oam_addr: u8,
    pub scroll_x: u8,
    pub scroll_y: u8,
    pub v: u16,
    pub t: u16,
    pub fine_x: u8,
    pub write_toggle: bool,
    pub read_buffer: u8,
    pub open_bus: u8,
    pub scanline: u16,
    pub cycle: u16,
    pub frame: u64,
    pub odd_frame: bool,
    pub nmi_line: bool,
    pub nmi_pending: bool,
    pub vblank_suppress: bool,
    pub sprite_eval_n: u8,
    pub sprite_count: u8,
    pub vram: [u8; 4096],
    pub oam: [u8; 256],
    pub palette: [u8; 32],
    pub secondary_oam: [u8; 32],
}

impl PpuState {
    /// Power-on lands mid-VBlank.
    pub fn power_on() -> Self {
        Self {
            ctrl: 0,
            mask: 0,
            status: STATUS_VBLANK,
            oam_addr: 0,
            scroll_x: 0,
            scroll_y: 0,
            v: 0,
            t: 0,
            fine_x: 0,
            write_toggle: false,
            read_buffer: 0,
            open_bus: 0,
            scanline: VBLANK_SCANLINE,
            cycle: 0,
            frame: 0,
            odd_frame: false,
            nmi_line: false,
            nmi_pending: false,
            vblank_suppress: false,
            sprite_eval_n: 0,
            sprite_count: 0,
            vram: [0; 4096],
            oam: [0; 256],
            palette: [0x0F; 32],
            secondary_oam: [0xFF; 32],
        }
    }

    pub fn in_vblank(&self) -> bool {
        (self.status & STATUS_VBLANK) != 0
    }
}

impl Default for PpuState {
    fn default() -> Self {
        Self::power_on()
    }
}

/// Edges observed while executing one PPU dot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuEvent {
    pub vblank_started: bool,
    pub vblank_ended: bool,
    pub frame_completed: bool,
}

pub struct Ppu {
    state: PpuState,
    pre_render_scanline: u16,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            state: PpuState::power_on(),
            pre_render_scanline: NTSC_PRE_RENDER_SCANLINE,
        }
    }

    pub fn state(&self) -> &PpuState {
        &self.state
    }

    pub fn set_state(&mut self, state: PpuState) {
        self.state = state;
    }

    pub fn reset(&mut self) {
        self.state = PpuState::power_on();
    }

    /// PAL frames run 312 scanlines and never skip a dot.
    pub fn set_pal_timing(&mut self, pal: bool) {
        self.pre_render_scanline = if pal {
            PAL_PRE_RENDER_SCANLINE
        } else {
            NTSC_PRE_RENDER_SCANLINE
        };
    }

    pub fn is_pal(&self) -> bool {
        self.pre_render_scanline == PAL_PRE_RENDER_SCANLINE
    }

    pub fn frame(&self) -> u64 {
        self.state.frame
    }

    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.state.nmi_pending)
    }

    pub fn rendering_enabled(&self) -> bool {
        (self.state.mask & (MASK_SHOW_BG | MASK_SHOW_SPRITES)) != 0
    }

    fn on_render_line(&self) -> bool {
        self.state.scanline < FRAME_HEIGHT as u16 || self.state.scanline == self.pre_render_scanline
    }

    fn update_nmi_line(&mut self) {
        let line = (self.state.ctrl & CTRL_NMI_ENABLE) != 0 && self.state.in_vblank();
        if line && !self.state.nmi_line {
            self.state.nmi_pending = true;
        }
        self.state.nmi_line = line;
    }

    pub fn read_register(&mut self, addr: u16, chr: &mut dyn ChrMemory) -> u8 {
        let value = match addr & 0x0007 {
            2 => {
                // Reading one dot before VBlank sets suppresses this frame's VBlank and NMI.
                if self.state.scanline == VBLANK_SCANLINE && self.state.cycle == 0 {
                    self.state.vblank_suppress = true;
                }
                let value = (self.state.status & 0xE0) | (self.state.open_bus & 0x1F);
                self.state.status &= !STATUS_VBLANK;
                self.state.write_toggle = false;
                self.update_nmi_line();
                value
            }
            4 => {
                let value = self.state.oam[self.state.oam_addr as usize];
                if (self.state.oam_addr & 0x03) == 2 {
                    value & 0xE3
                } else {
                    value
                }
            }
            7 => {
                let addr = self.state.v & 0x3FFF;
                let value = self.read_vram(addr, chr);
                let result = if let PpuRegion::Palette(_) = PpuRegion::decode(addr) {
                    // Palette reads are immediate; the buffer sees the nametable underneath.
                    self.state.read_buffer = self.read_vram(addr.wrapping_sub(0x1000), chr);
                    value
                } else {
                    std::mem::replace(&mut self.state.read_buffer, value)
                };
                self.increment_vram_addr_cpu_access();
                result
            }
            _ => self.state.open_bus,
        };
        self.state.open_bus = value;
        value
    }

    pub fn write_register(&mut self, addr: u16, value: u8, chr: &mut dyn ChrMemory) {
        self.state.open_bus = value;
        match addr & 0x0007 {
            0 => {
                self.state.ctrl = value;
                self.state.t = (self.state.t & !0x0C00) | (((value as u16) & 0x03) << 10);
                self.update_nmi_line();
            }
            1 => self.state.mask = value,
            3 => self.state.oam_addr = value,
            4 => {
                self.state.oam[self.state.oam_addr as usize] = value;
                self.state.oam_addr = self.state.oam_addr.wrapping_add(1);
            }
            5 => {
                if !self.state.write_toggle {
                    self.state.scroll_x = value;
                    self.state.fine_x = value & 0x07;
                    self.state.t = (self.state.t & !0x001F) | ((value as u16) >> 3);
                } else {
                    self.state.scroll_y = value;
                    self.state.t = (self.state.t & !0x73E0)
                        | (((value as u16) & 0x07) << 12)
                        | (((value as u16) >> 3) << 5);
                }
                self.state.write_toggle = !self.state.write_toggle;
            }
            6 => {
                if !self.state.write_toggle {
                    self.state.t = (self.state.t & 0x00FF) | (((value as u16) & 0x3F) << 8);
                } else {
                    self.state.t = (self.state.t & 0x7F00) | value as u16;
                    self.state.v = self.state.t;
                }
                self.state.write_toggle = !self.state.write_toggle;
            }
            7 => {
                let addr = self.state.v & 0x3FFF;
                self.write_vram(addr, value, chr);
                self.increment_vram_addr_cpu_access();
            }
            _ => {}
        }
    }

    pub fn write_oam_dma(&mut self, bytes: &[u8; 256]) {
        for &byte in bytes {
            self.state.oam[self.state.oam_addr as usize] = byte;
            self.state.oam_addr = self.state.oam_addr.wrapping_add(1);
        }
    }

    /// Advance one dot.
    pub fn execute_cycle(&mut self, chr: &mut dyn ChrMemory) -> PpuEvent {
        let mut event = PpuEvent::default();
        let scanline = self.state.scanline;
        let cycle = self.state.cycle;
        let visible_line = scanline < FRAME_HEIGHT as u16;
        let pre_render = scanline == self.pre_render_scanline;
        let rendering = self.rendering_enabled();

        if scanline == VBLANK_SCANLINE && cycle == 1 {
            if !self.state.vblank_suppress {
                self.state.status |= STATUS_VBLANK;
            }
            self.state.vblank_suppress = false;
            self.update_nmi_line();
            event.vblank_started = true;
        }

        if pre_render && cycle == 1 {
            self.state.status &=
                !(STATUS_VBLANK | STATUS_SPRITE_ZERO_HIT | STATUS_SPRITE_OVERFLOW);
            self.update_nmi_line();
            event.vblank_ended = true;
        }

        if visible_line {
            if (1..=256).contains(&cycle) {
                self.check_sprite_zero_hit(chr);
            }
            if cycle == 64 {
                self.state.secondary_oam = [0xFF; 32];
                self.state.sprite_count = 0;
                self.state.sprite_eval_n = 0;
            }
            if rendering && (65..=256).contains(&cycle) && (cycle & 1) == 1 {
                self.evaluate_next_sprite();
            }
        }

        if rendering && (visible_line || pre_render) {
            if ((1..=256).contains(&cycle) || (321..=336).contains(&cycle)) && (cycle & 0x07) == 0 {
                self.increment_coarse_x();
            }
            match cycle {
                256 => self.increment_y(),
                257 => self.copy_horizontal_bits(),
                280..=304 if pre_render => self.copy_vertical_bits(),
                MMC3_CLOCK_CYCLE => chr.notify_scanline(),
                _ => {}
            }
        }

        // NTSC odd frames drop dot 339 of the pre-render line.
        let skip_dot = pre_render
            && rendering
            && self.state.odd_frame
            && cycle == 338
            && !self.is_pal();
        self.state.cycle = if skip_dot { LAST_CYCLE } else { cycle + 1 };

        if self.state.cycle > LAST_CYCLE {
            self.state.cycle = 0;
            self.state.scanline += 1;
            if self.state.scanline > self.pre_render_scanline {
                self.state.scanline = 0;
                self.state.frame = self.state.frame.wrapping_add(1);
                self.state.odd_frame = !self.state.odd_frame;
                event.frame_completed = true;
            }
        }

        event
    }

    fn sprite_height(&self) -> usize {
        if (self.state.ctrl & CTRL_SPRITE_SIZE_16) != 0 {
            16
        } else {
            8
        }
    }

    /// One step of secondary-OAM evaluation for the next scanline.
    fn evaluate_next_sprite(&mut self) {
        let n = self.state.sprite_eval_n as usize;
        if n >= 64 {
            return;
        }
        self.state.sprite_eval_n += 1;

        let y = self.state.oam[n * 4] as usize;
        let line = self.state.scanline as usize;
        if line < y || line - y >= self.sprite_height() {
            return;
        }

        let count = self.state.sprite_count as usize;
        if count < 8 {
            let dst = count * 4;
            self.state.secondary_oam[dst..dst + 4].copy_from_slice(&self.state.oam[n * 4..n * 4 + 4]);
            self.state.sprite_count += 1;
        } else {
            self.state.status |= STATUS_SPRITE_OVERFLOW;
            self.state.sprite_eval_n = 64;
        }
    }

    fn check_sprite_zero_hit(&mut self, chr: &dyn ChrMemory) {
        const BOTH: u8 = MASK_SHOW_BG | MASK_SHOW_SPRITES;
        const BOTH_LEFT: u8 = MASK_SHOW_BG_LEFT | MASK_SHOW_SPRITE_LEFT;

        let state = &self.state;
        if (state.status & STATUS_SPRITE_ZERO_HIT) != 0 || (state.mask & BOTH) != BOTH {
            return;
        }
        let x = state.cycle as usize - 1;
        let y = state.scanline as usize;
        if x == 255 || (x < 8 && (state.mask & BOTH_LEFT) != BOTH_LEFT) {
            return;
        }
        if self.sprite_zero_pixel(x, y, chr) == 0 {
            return;
        }
        if self.background_pixel(x, y, chr).0 != 0 {
            self.state.status |= STATUS_SPRITE_ZERO_HIT;
        }
    }

    fn sprite_zero_pixel(&self, x: usize, y: usize, chr: &dyn ChrMemory) -> u8 {
        let oam = &self.state.oam;
        let top = oam[0] as usize + 1;
        let left = oam[3] as usize;
        let height = self.sprite_height();
        if y < top || y >= top + height || x < left || x >= left + 8 {
            return 0;
        }

        let attributes = oam[2];
        let mut row = y - top;
        let mut col = x - left;
        if (attributes & 0x80) != 0 {
            row = height - 1 - row;
        }
        if (attributes & 0x40) != 0 {
            col = 7 - col;
        }

        let tile = oam[1] as u16;
        let (table, tile) = if height == 16 {
            ((tile & 0x01) * 0x1000, (tile & 0xFE) + (row / 8) as u16)
        } else if (self.state.ctrl & CTRL_SPRITE_TABLE) != 0 {
            (0x1000, tile)
        } else {
            (0x0000, tile)
        };
        let addr = table + tile * 16 + (row & 0x07) as u16;
        pattern_bit(chr.read_chr(addr), chr.read_chr(addr + 8), col)
    }

    /// Background pixel value (0-3) and palette selector at screen `(x, y)`,
    /// resolved from the control register's nametable bits and the scroll
    /// registers.
    pub fn background_pixel(&self, x: usize, y: usize, chr: &dyn ChrMemory) -> (u8, u8) {
        let state = &self.state;
        let mut nt_x = (state.ctrl & 0x01) as usize;
        let mut nt_y = ((state.ctrl >> 1) & 0x01) as usize;
        let mut px = x + state.scroll_x as usize;
        let mut py = y + state.scroll_y as usize;
        if px >= FRAME_WIDTH {
            px -= FRAME_WIDTH;
            nt_x ^= 1;
        }
        if py >= FRAME_HEIGHT {
            py -= FRAME_HEIGHT;
            nt_y ^= 1;
        }

        let base = 0x2000 + ((nt_y << 1) | nt_x) as u16 * 0x0400;
        let tile_x = (px / 8) as u16;
        let tile_y = (py / 8) as u16;
        let tile = self.peek_vram(base + tile_y * 32 + tile_x, chr) as u16;

        let pattern_base = if (state.ctrl & CTRL_BG_TABLE) != 0 {
            0x1000
        } else {
            0x0000
        };
        let addr = pattern_base + tile * 16 + (py % 8) as u16;
        let pixel = pattern_bit(chr.read_chr(addr), chr.read_chr(addr + 8), px % 8);

        let attribute = self.peek_vram(base + 0x03C0 + (tile_y / 4) * 8 + tile_x / 4, chr);
        let shift = ((tile_y & 0x02) << 1) | (tile_x & 0x02);
        (pixel, (attribute >> shift) & 0x03)
    }

    /// Palette-RAM colour indices for every background pixel of a 256x240 frame.
    pub fn render_background(&self, chr: &dyn ChrMemory) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_WIDTH * FRAME_HEIGHT);
        for y in 0..FRAME_HEIGHT {
            for x in 0..FRAME_WIDTH {
                let (pixel, select) = self.background_pixel(x, y, chr);
                let addr = if pixel == 0 {
                    0x3F00
                } else {
                    0x3F00 + (select as u16) * 4 + pixel as u16
                };
                frame.push(self.peek_vram(addr, chr) & 0x3F);
            }
        }
        frame
    }

    /// Side-effect-free read of PPU address space.
    pub fn peek_vram(&self, addr: u16, chr: &dyn ChrMemory) -> u8 {
        match PpuRegion::decode(addr) {
            PpuRegion::Chr(addr) => chr.read_chr(addr),
            PpuRegion::Nametable(offset) => {
                self.state.vram[nametable_index(offset, chr.mirroring())]
            }
            PpuRegion::Palette(index) => self.state.palette[index],
        }
    }

    fn read_vram(&mut self, addr: u16, chr: &mut dyn ChrMemory) -> u8 {
        self.peek_vram(addr, chr)
    }

    fn write_vram(&mut self, addr: u16, value: u8, chr: &mut dyn ChrMemory) {
        match PpuRegion::decode(addr) {
            PpuRegion::Chr(addr) => chr.write_chr(addr, value),
            PpuRegion::Nametable(offset) => {
                self.state.vram[nametable_index(offset, chr.mirroring())] = value;
            }
            PpuRegion::Palette(index) => self.state.palette[index] = value & 0x3F,
        }
    }

    fn increment_vram_addr_cpu_access(&mut self) {
        // $2007 during rendering bumps v through the rendering increments.
        if self.rendering_enabled() && self.on_render_line() {
            self.increment_coarse_x();
            self.increment_y();
        } else if (self.state.ctrl & CTRL_VRAM_INC_32) != 0 {
            self.state.v = self.state.v.wrapping_add(32) & 0x7FFF;
        } else {
            self.state.v = self.state.v.wrapping_add(1) & 0x7FFF;
        }
    }

    fn increment_coarse_x(&mut self) {
        if (self.state.v & 0x001F) == 31 {
            self.state.v &= !0x001F;
            self.state.v ^= 0x0400;
        } else {
            self.state.v += 1;
        }
    }

    fn increment_y(&mut self) {
        if (self.state.v & 0x7000) != 0x7000 {
            self.state.v += 0x1000;
            return;
        }

        self.state.v &= !0x7000;
        let mut y = (self.state.v & 0x03E0) >> 5;
        if y == 29 {
            y = 0;
            self.state.v ^= 0x0800;
        } else if y == 31 {
            y = 0;
        } else {
            y += 1;
        }
        self.state.v = (self.state.v & !0x03E0) | (y << 5);
    }

    fn copy_horizontal_bits(&mut self) {
        self.state.v = (self.state.v & !0x041F) | (self.state.t & 0x041F);
    }

    fn copy_vertical_bits(&mut self) {
        self.state.v = (self.state.v & !0x7BE0) | (self.state.t & 0x7BE0);
    }
}

fn pattern_bit(lo: u8, hi: u8, col: usize) -> u8 {
    let shift = 7 - col;
    (((hi >> shift) & 0x01) << 1) | ((lo >> shift) & 0x01)
}

impl ClockedComponent for Ppu {
    type Bus = dyn ChrMemory;
    type State = PpuState;
    type Event = PpuEvent;

    fn execute_cycle(&mut self, bus: &mut Self::Bus) -> PpuEvent {
        Ppu::execute_cycle(self, bus)
    }

    fn reset(&mut self, _bus: &mut Self::Bus) {
        Ppu::reset(self);
    }

    fn state(&self) -> PpuState {
        self.state.clone()
    }

    fn set_state(&mut self, state: PpuState) {
        Ppu::set_state(self, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestChr {
        chr: Vec<u8>,
        mirroring: Mirroring,
        scanlines: u32,
    }

    impl TestChr {
        fn new() -> Self {
            Self {
                chr: vec![0; 0x2000],
                mirroring: Mirroring::Vertical,
                scanlines: 0,
            }
        }
    }

    impl ChrMemory for TestChr {
        fn read_chr(&self, addr: u16) -> u8 {
            self.chr[addr as usize & 0x1FFF]
        }

        fn write_chr(&mut self, addr: u16, value: u8) {
            self.chr[addr as usize & 0x1FFF] = value;
        }

        fn mirroring(&self) -> Mirroring {
            self.mirroring
        }

        fn notify_scanline(&mut self) {
            self.scanlines += 1;
        }
    }

    fn run_until(ppu: &mut Ppu, chr: &mut TestChr, scanline: u16, cycle: u16) {
        while !(ppu.state().scanline == scanline && ppu.state().cycle == cycle) {
            ppu.execute_cycle(chr);
        }
    }

    fn set_addr(ppu: &mut Ppu, chr: &mut TestChr, addr: u16) {
        ppu.write_register(0x2006, (addr >> 8) as u8, chr);
        ppu.write_register(0x2006, addr as u8, chr);
    }

    #[test]
    fn power_on_is_mid_vblank() {
        let ppu = Ppu::new();
        assert_eq!(ppu.state().scanline, 241);
        assert_eq!(ppu.state().cycle, 0);
        assert!(ppu.state().in_vblank());
    }

    #[test]
    fn vblank_sets_at_241_1_and_clears_at_261_1() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        ppu.execute_cycle(&mut chr);
        ppu.read_register(0x2002, &mut chr);
        assert!(!ppu.state().in_vblank());

        let event = ppu.execute_cycle(&mut chr);
        assert!(event.vblank_started);
        assert!(ppu.state().in_vblank());

        run_until(&mut ppu, &mut chr, 261, 1);
        assert!(ppu.state().in_vblank());
        let event = ppu.execute_cycle(&mut chr);
        assert!(event.vblank_ended);
        assert!(!ppu.state().in_vblank());
    }

    #[test]
    fn status_read_clears_vblank_and_write_toggle() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        ppu.write_register(0x2005, 0x10, &mut chr);
        assert!(ppu.state().write_toggle);
        let status = ppu.read_register(0x2002, &mut chr);
        assert_eq!(status & STATUS_VBLANK, STATUS_VBLANK);
        assert!(!ppu.state().write_toggle);
        assert_eq!(ppu.read_register(0x2002, &mut chr) & STATUS_VBLANK, 0);
    }

    #[test]
    fn enabling_nmi_during_vblank_raises_edge_immediately() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        ppu.write_register(0x2000, CTRL_NMI_ENABLE, &mut chr);
        assert!(ppu.take_nmi());
        assert!(!ppu.take_nmi());

        // Toggling the enable bit without leaving VBlank re-arms the edge.
        ppu.write_register(0x2000, 0, &mut chr);
        ppu.write_register(0x2000, CTRL_NMI_ENABLE, &mut chr);
        assert!(ppu.take_nmi());
    }

    #[test]
    fn enabling_nmi_outside_vblank_waits_for_next_frame() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        ppu.execute_cycle(&mut chr);
        ppu.read_register(0x2002, &mut chr);
        ppu.write_register(0x2000, CTRL_NMI_ENABLE, &mut chr);
        assert!(!ppu.take_nmi());

        ppu.execute_cycle(&mut chr);
        assert!(ppu.take_nmi());
    }

    #[test]
    fn status_read_before_vblank_suppresses_it() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        ppu.write_register(0x2000, CTRL_NMI_ENABLE, &mut chr);
        ppu.take_nmi();
        run_until(&mut ppu, &mut chr, 241, 0);
        ppu.read_register(0x2002, &mut chr);
        ppu.execute_cycle(&mut chr);
        ppu.execute_cycle(&mut chr);
        assert!(!ppu.state().in_vblank());
        assert!(!ppu.take_nmi());
    }

    #[test]
    fn ppudata_reads_are_buffered_except_palette() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        set_addr(&mut ppu, &mut chr, 0x2400);
        ppu.write_register(0x2007, 0xAB, &mut chr);
        ppu.write_register(0x2007, 0xCD, &mut chr);

        set_addr(&mut ppu, &mut chr, 0x2400);
        let _stale = ppu.read_register(0x2007, &mut chr);
        assert_eq!(ppu.read_register(0x2007, &mut chr), 0xAB);
        assert_eq!(ppu.read_register(0x2007, &mut chr), 0xCD);

        set_addr(&mut ppu, &mut chr, 0x3F01);
        ppu.write_register(0x2007, 0x21, &mut chr);
        set_addr(&mut ppu, &mut chr, 0x3F01);
        assert_eq!(ppu.read_register(0x2007, &mut chr), 0x21);
    }

    #[test]
    fn vram_increment_follows_ctrl() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        ppu.write_register(0x2000, CTRL_VRAM_INC_32, &mut chr);
        set_addr(&mut ppu, &mut chr, 0x2000);
        ppu.write_register(0x2007, 1, &mut chr);
        assert_eq!(ppu.state().v, 0x2020);
    }

    #[test]
    fn palette_backdrop_mirrors() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        set_addr(&mut ppu, &mut chr, 0x3F10);
        ppu.write_register(0x2007, 0x2A, &mut chr);
        assert_eq!(ppu.state().palette[0], 0x2A);
        assert_eq!(ppu.peek_vram(0x3F00, &chr), 0x2A);
    }

    #[test]
    fn vertical_mirroring_aliases_2000_and_2800() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        set_addr(&mut ppu, &mut chr, 0x2005);
        ppu.write_register(0x2007, 0x77, &mut chr);
        assert_eq!(ppu.peek_vram(0x2805, &chr), 0x77);
        assert_eq!(ppu.peek_vram(0x2405, &chr), 0x00);
    }

    #[test]
    fn frame_is_262_by_341_dots() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        let mut vblanks = 0;
        for _ in 0..262 * 341 {
            if ppu.execute_cycle(&mut chr).vblank_started {
                vblanks += 1;
            }
        }
        assert_eq!(ppu.frame(), 1);
        assert_eq!(vblanks, 1);
        assert_eq!((ppu.state().scanline, ppu.state().cycle), (241, 0));
    }

    #[test]
    fn odd_frames_skip_a_dot_when_rendering() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        ppu.write_register(0x2001, MASK_SHOW_BG, &mut chr);
        run_until(&mut ppu, &mut chr, 0, 0);

        let mut lengths = Vec::new();
        for _ in 0..2 {
            let mut dots = 0u32;
            loop {
                dots += 1;
                if ppu.execute_cycle(&mut chr).frame_completed {
                    break;
                }
            }
            lengths.push(dots);
        }
        lengths.sort_unstable();
        assert_eq!(lengths, vec![89_341, 89_342]);
    }

    #[test]
    fn sprite_zero_hit_on_opaque_overlap() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        // Tile 1 is solid in the low plane.
        for row in 0..8 {
            chr.chr[16 + row] = 0xFF;
        }
        set_addr(&mut ppu, &mut chr, 0x2000);
        for _ in 0..32 * 30 {
            ppu.write_register(0x2007, 1, &mut chr);
        }
        ppu.write_register(0x2003, 0, &mut chr);
        for byte in [29, 1, 0, 40] {
            ppu.write_register(0x2004, byte, &mut chr);
        }
        ppu.write_register(0x2006, 0, &mut chr);
        ppu.write_register(0x2006, 0, &mut chr);
        ppu.write_register(0x2001, 0x1E, &mut chr);

        run_until(&mut ppu, &mut chr, 30, 41);
        assert_eq!(ppu.state().status & STATUS_SPRITE_ZERO_HIT, 0);
        ppu.execute_cycle(&mut chr);
        assert_ne!(ppu.state().status & STATUS_SPRITE_ZERO_HIT, 0);
    }

    #[test]
    fn ninth_sprite_on_a_line_sets_overflow() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        ppu.write_register(0x2003, 0, &mut chr);
        for i in 0..64u8 {
            let y = if i < 9 { 50 } else { 0xF0 };
            for byte in [y, 0, 0, i] {
                ppu.write_register(0x2004, byte, &mut chr);
            }
        }
        ppu.write_register(0x2001, MASK_SHOW_SPRITES, &mut chr);
        run_until(&mut ppu, &mut chr, 50, 257);
        assert_eq!(ppu.state().sprite_count, 8);
        assert_ne!(ppu.state().status & STATUS_SPRITE_OVERFLOW, 0);
        assert_eq!(ppu.state().secondary_oam[7 * 4 + 3], 7);
    }

    #[test]
    fn scanline_notifications_only_while_rendering() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        for _ in 0..262 * 341 {
            ppu.execute_cycle(&mut chr);
        }
        assert_eq!(chr.scanlines, 0);

        ppu.write_register(0x2001, MASK_SHOW_BG, &mut chr);
        run_until(&mut ppu, &mut chr, 0, 0);
        let before = chr.scanlines;
        run_until(&mut ppu, &mut chr, 240, 0);
        assert_eq!(chr.scanlines - before, 240);
    }

    #[test]
    fn render_background_uses_attribute_palette() {
        let mut ppu = Ppu::new();
        let mut chr = TestChr::new();
        for row in 0..8 {
            chr.chr[16 + row] = 0xFF;
        }
        set_addr(&mut ppu, &mut chr, 0x2000);
        ppu.write_register(0x2007, 1, &mut chr);
        set_addr(&mut ppu, &mut chr, 0x23C0);
        ppu.write_register(0x2007, 0x02, &mut chr);
        set_addr(&mut ppu, &mut chr, 0x3F00);
        for color in [0x0F, 0x01, 0x02, 0x03, 0x0F, 0x11, 0x12, 0x13, 0x0F, 0x21] {
            ppu.write_register(0x2007, color, &mut chr);
        }

        let frame = ppu.render_background(&chr);
        assert_eq!(frame.len(), FRAME_WIDTH * FRAME_HEIGHT);
        assert_eq!(frame[0], 0x21);
        assert_eq!(frame[8], 0x0F);
    }
}
