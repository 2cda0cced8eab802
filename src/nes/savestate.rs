//! Versioned save-state byte layout.
//!
//! All integers are little-endian. The blob is the version, the mapper id,
//! one block per component, the opaque size-prefixed mapper blob, and a
//! SHA-1 of everything before it. Decoding validates the whole blob into a
//! detached [`Snapshot`]; nothing live is touched until the caller commits.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};
use thiserror::Error;

use super::apu::ApuState;
use super::bus::{ControllerPort, MemoryState, RAM_SIZE};
use super::clock::{COMPONENT_COUNT, TimingMode, TimingState};
use super::cpu::{CpuState, InFlight, MAX_PENALTY};
use super::interrupt::{InterruptKind, PendingInterrupts};
use super::opcodes::lookup;
use super::ppu::{LAST_CYCLE, PAL_PRE_RENDER_SCANLINE, PpuState};

pub const SAVE_STATE_VERSION: u32 = 2;
const CHECKSUM_LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SaveStateError {
    #[error("save state is truncated")]
    Truncated,
    #[error("unsupported save-state version {0}")]
    UnsupportedVersion(u32),
    #[error("save-state checksum mismatch")]
    ChecksumMismatch,
    #[error("save state was taken with mapper {found}, loaded cartridge uses mapper {expected}")]
    MapperMismatch { expected: u16, found: u16 },
    #[error("malformed save state: {0}")]
    Layout(String),
    #[error("mapper state rejected: {0}")]
    MapperState(String),
}

/// Every piece of emulator state captured at a tick boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub mapper_id: u16,
    pub timing: TimingState,
    pub cpu: CpuState,
    pub ppu: PpuState,
    pub memory: MemoryState,
    pub apu: ApuState,
    pub mapper_state: Vec<u8>,
}

impl Snapshot {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.u32(SAVE_STATE_VERSION);
        w.u16(self.mapper_id);
        write_timing(&mut w, &self.timing);
        write_cpu(&mut w, &self.cpu);
        write_ppu(&mut w, &self.ppu);
        write_memory(&mut w, &self.memory);
        write_apu(&mut w, &self.apu);
        w.blob(&self.mapper_state);

        let digest = Sha1::digest(&w.bytes);
        w.bytes.extend_from_slice(&digest);
        w.bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SaveStateError> {
        if bytes.len() < 4 + CHECKSUM_LEN {
            return Err(SaveStateError::Truncated);
        }
        let version = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if version != SAVE_STATE_VERSION {
            return Err(SaveStateError::UnsupportedVersion(version));
        }

        let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if Sha1::digest(body).as_slice() != checksum {
            return Err(SaveStateError::ChecksumMismatch);
        }

        let mut r = Reader::new(&body[4..]);
        let snapshot = Snapshot {
            mapper_id: r.u16()?,
            timing: read_timing(&mut r)?,
            cpu: read_cpu(&mut r)?,
            ppu: read_ppu(&mut r)?,
            memory: read_memory(&mut r)?,
            apu: read_apu(&mut r)?,
            mapper_state: r.blob()?.to_vec(),
        };
        if !r.is_empty() {
            return Err(SaveStateError::Layout(format!(
                "{} unexpected trailing bytes",
                r.remaining()
            )));
        }
        Ok(snapshot)
    }
}

/// Short printable identity for a save-state blob: base64 of its SHA-1.
pub fn fingerprint(bytes: &[u8]) -> String {
    STANDARD.encode(Sha1::digest(bytes))
}

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn bool(&mut self, value: bool) {
        self.bytes.push(u8::from(value));
    }

    fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn blob(&mut self, bytes: &[u8]) {
        self.u32(bytes.len() as u32);
        self.raw(bytes);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SaveStateError> {
        if self.remaining() < len {
            return Err(SaveStateError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SaveStateError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, SaveStateError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, SaveStateError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SaveStateError::Layout(format!(
                "invalid boolean byte {other:#04X} at offset {}",
                self.pos - 1
            ))),
        }
    }

    fn u16(&mut self) -> Result<u16, SaveStateError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, SaveStateError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, SaveStateError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn blob(&mut self) -> Result<&'a [u8], SaveStateError> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

fn write_timing(w: &mut Writer, timing: &TimingState) {
    w.u64(timing.master_cycle);
    w.u8(timing.mode.to_byte());
    w.bool(timing.running);
    for &owed in &timing.remainders {
        w.u32(owed);
    }
}

fn read_timing(r: &mut Reader) -> Result<TimingState, SaveStateError> {
    let master_cycle = r.u64()?;
    let mode_byte = r.u8()?;
    let mode = TimingMode::from_byte(mode_byte)
        .ok_or_else(|| SaveStateError::Layout(format!("unknown timing mode {mode_byte}")))?;
    let running = r.bool()?;
    let mut remainders = [0u32; COMPONENT_COUNT];
    for owed in &mut remainders {
        *owed = r.u32()?;
    }
    let timing = TimingState {
        master_cycle,
        mode,
        running,
        remainders,
    };
    if !timing.remainders_in_range() {
        return Err(SaveStateError::Layout(format!(
            "clock remainders {remainders:?} out of range for {mode:?}"
        )));
    }
    Ok(timing)
}

fn interrupt_to_byte(kind: InterruptKind) -> u8 {
    match kind {
        InterruptKind::Nmi => 0,
        InterruptKind::Irq => 1,
        InterruptKind::Reset => 2,
    }
}

fn write_cpu(w: &mut Writer, cpu: &CpuState) {
    w.raw(&[cpu.a, cpu.x, cpu.y, cpu.p, cpu.sp]);
    w.u16(cpu.pc);
    w.u16(cpu.opcode_pc);
    w.u8(cpu.instruction_cycle);
    match cpu.in_flight {
        InFlight::Idle => w.raw(&[0, 0]),
        InFlight::Opcode(opcode) => w.raw(&[1, opcode]),
        InFlight::Interrupt(kind) => w.raw(&[2, interrupt_to_byte(kind)]),
    }
    w.u8(cpu.penalty);
    w.u64(cpu.total_cycles);
    w.bool(cpu.halted);
    w.u8(cpu.pending.bits());
    w.u16(cpu.stall_cycles);
}

fn read_cpu(r: &mut Reader) -> Result<CpuState, SaveStateError> {
    let [a, x, y, p, sp] = r.array::<5>()?;
    let pc = r.u16()?;
    let opcode_pc = r.u16()?;
    let instruction_cycle = r.u8()?;
    let [tag, payload] = r.array::<2>()?;
    let in_flight = match (tag, payload) {
        (0, _) => InFlight::Idle,
        (1, opcode) => InFlight::Opcode(opcode),
        (2, 0) => InFlight::Interrupt(InterruptKind::Nmi),
        (2, 1) => InFlight::Interrupt(InterruptKind::Irq),
        (2, 2) => InFlight::Interrupt(InterruptKind::Reset),
        _ => {
            return Err(SaveStateError::Layout(format!(
                "invalid in-flight operation {tag}/{payload}"
            )));
        }
    };
    if let InFlight::Opcode(opcode) = in_flight
        && !lookup(opcode).is_executable()
    {
        return Err(SaveStateError::Layout(format!(
            "opcode ${opcode:02X} cannot be in flight"
        )));
    }
    let penalty = r.u8()?;
    if penalty > MAX_PENALTY || instruction_cycle > in_flight.base_cycles() + penalty {
        return Err(SaveStateError::Layout(format!(
            "CPU cycle {instruction_cycle}+{penalty} out of range for {in_flight:?}"
        )));
    }
    Ok(CpuState {
        a,
        x,
        y,
        p,
        sp,
        pc,
        opcode_pc,
        instruction_cycle,
        in_flight,
        penalty,
        total_cycles: r.u64()?,
        halted: r.bool()?,
        pending: PendingInterrupts::from_bits(r.u8()?),
        stall_cycles: r.u16()?,
    })
}

fn write_ppu(w: &mut Writer, ppu: &PpuState) {
    w.raw(&[
        ppu.ctrl,
        ppu.mask,
        ppu.status,
        ppu.oam_addr,
        ppu.scroll_x,
        ppu.scroll_y,
    ]);
    w.u16(ppu.v);
    w.u16(ppu.t);
    w.u8(ppu.fine_x);
    w.bool(ppu.write_toggle);
    w.u8(ppu.read_buffer);
    w.u8(ppu.open_bus);
    w.u16(ppu.scanline);
    w.u16(ppu.cycle);
    w.u64(ppu.frame);
    w.bool(ppu.odd_frame);
    w.bool(ppu.nmi_line);
    w.bool(ppu.nmi_pending);
    w.bool(ppu.vblank_suppress);
    w.u8(ppu.sprite_eval_n);
    w.u8(ppu.sprite_count);
    w.raw(&ppu.vram);
    w.raw(&ppu.oam);
    w.raw(&ppu.palette);
    w.raw(&ppu.secondary_oam);
}

fn read_ppu(r: &mut Reader) -> Result<PpuState, SaveStateError> {
    let [ctrl, mask, status, oam_addr, scroll_x, scroll_y] = r.array::<6>()?;
    let state = PpuState {
        ctrl,
        mask,
        status,
        oam_addr,
        scroll_x,
        scroll_y,
        v: r.u16()?,
        t: r.u16()?,
        fine_x: r.u8()?,
        write_toggle: r.bool()?,
        read_buffer: r.u8()?,
        open_bus: r.u8()?,
        scanline: r.u16()?,
        cycle: r.u16()?,
        frame: r.u64()?,
        odd_frame: r.bool()?,
        nmi_line: r.bool()?,
        nmi_pending: r.bool()?,
        vblank_suppress: r.bool()?,
        sprite_eval_n: r.u8()?,
        sprite_count: r.u8()?,
        vram: r.array()?,
        oam: r.array()?,
        palette: r.array()?,
        secondary_oam: r.array()?,
    };
    if state.cycle > LAST_CYCLE || state.scanline > PAL_PRE_RENDER_SCANLINE {
        return Err(SaveStateError::Layout(format!(
            "PPU position ({}, {}) out of range",
            state.scanline, state.cycle
        )));
    }
    Ok(state)
}

fn write_memory(w: &mut Writer, memory: &MemoryState) {
    w.raw(&memory.ram);
    for pad in &memory.controllers {
        w.u8(pad.buttons);
        w.u8(pad.shift);
    }
    w.bool(memory.strobe);
    w.u8(memory.open_bus);
    w.blob(&memory.prg_ram);
    w.blob(&memory.chr_ram);
}

fn read_memory(r: &mut Reader) -> Result<MemoryState, SaveStateError> {
    let ram: [u8; RAM_SIZE] = r.array()?;
    let mut controllers = [ControllerPort::default(); 2];
    for pad in &mut controllers {
        pad.buttons = r.u8()?;
        pad.shift = r.u8()?;
    }
    Ok(MemoryState {
        ram,
        controllers,
        strobe: r.bool()?,
        open_bus: r.u8()?,
        prg_ram: r.blob()?.to_vec(),
        chr_ram: r.blob()?.to_vec(),
    })
}

fn write_apu(w: &mut Writer, apu: &ApuState) {
    w.raw(&apu.registers);
    w.raw(&apu.length_counters);
    w.u8(apu.enabled);
    w.u32(apu.frame_counter);
    w.bool(apu.five_step);
    w.bool(apu.irq_inhibit);
    w.bool(apu.frame_irq);
    match apu.pending_frame_write {
        Some((value, delay)) => w.raw(&[1, value, delay]),
        None => w.raw(&[0, 0, 0]),
    }
    w.u64(apu.cpu_cycle);
}

fn read_apu(r: &mut Reader) -> Result<ApuState, SaveStateError> {
    let registers = r.array()?;
    let length_counters = r.array()?;
    let enabled = r.u8()?;
    let frame_counter = r.u32()?;
    let five_step = r.bool()?;
    let irq_inhibit = r.bool()?;
    let frame_irq = r.bool()?;
    let pending = r.bool()?;
    let [value, delay] = r.array::<2>()?;
    Ok(ApuState {
        registers,
        length_counters,
        enabled,
        frame_counter,
        five_step,
        irq_inhibit,
        frame_irq,
        pending_frame_write: pending.then_some((value, delay)),
        cpu_cycle: r.u64()?,
    })
}
