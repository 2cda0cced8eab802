use super::clock::ClockedComponent;
use super::interrupt::{InterruptKind, PendingInterrupts, RESET_VECTOR};
use super::opcodes::{AddressingMode, InstructionDefinition, Mnemonic, lookup};

pub const FLAG_CARRY: u8 = 0x01;
pub const FLAG_ZERO: u8 = 0x02;
pub const FLAG_INTERRUPT: u8 = 0x04;
pub const FLAG_DECIMAL: u8 = 0x08;
pub const FLAG_BREAK: u8 = 0x10;
pub const FLAG_UNUSED: u8 = 0x20;
pub const FLAG_OVERFLOW: u8 = 0x40;
pub const FLAG_NEGATIVE: u8 = 0x80;

const STACK_PAGE: u16 = 0x0100;
const INTERRUPT_CYCLES: u8 = 7;
/// Page cross plus branch taken.
pub(crate) const MAX_PENALTY: u8 = 2;
const OAM_DMA_STALL_CYCLES: u16 = 513;

/// The CPU's view of the system bus.
pub trait CpuBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);

    /// Returns true once after a write that started an OAM DMA transfer.
    fn take_dma_request(&mut self) -> bool {
        false
    }

    fn on_instruction_fetched(&mut self, _pc: u16, _opcode: u8, _state: &CpuState) {}
}

/// What the CPU is in the middle of between instruction boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InFlight {
    #[default]
    Idle,
    Opcode(u8),
    Interrupt(InterruptKind),
}

impl InFlight {
    /// Cycles before any page-cross or branch penalty.
    pub(crate) fn base_cycles(self) -> u8 {
        match self {
            InFlight::Opcode(opcode) => lookup(opcode).cycles,
            InFlight::Interrupt(_) => INTERRUPT_CYCLES,
            InFlight::Idle => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuState {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,
    pub pc: u16,
    /// Address the in-flight opcode was fetched from.
    pub opcode_pc: u16,
    /// Cycles already spent on the in-flight instruction; 0 at a boundary.
    pub instruction_cycle: u8,
    pub in_flight: InFlight,
    /// Extra cycles (page cross, branch taken) resolved on the execute cycle.
    pub penalty: u8,
    pub total_cycles: u64,
    pub halted: bool,
    pub pending: PendingInterrupts,
    pub stall_cycles: u16,
}

impl CpuState {
    pub fn power_on() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            p: FLAG_INTERRUPT | FLAG_UNUSED,
            sp: 0xFD,
            pc: 0,
            opcode_pc: 0,
            instruction_cycle: 0,
            in_flight: InFlight::Idle,
            penalty: 0,
            total_cycles: 0,
            halted: false,
            pending: PendingInterrupts::default(),
            stall_cycles: 0,
        }
    }

    pub fn flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self::power_on()
    }
}

/// Outcome of a single CPU cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuEvent {
    /// Mid-instruction.
    Busy,
    /// Cycle swallowed by an OAM DMA transfer.
    Stalled,
    /// The instruction fetched from `pc` finished on this cycle.
    InstructionCompleted { pc: u16, opcode: u8 },
    InterruptServiced(InterruptKind),
    /// An unimplemented opcode was fetched; the CPU is now halted.
    Halted { pc: u16, opcode: u8 },
    /// Already halted, waiting for NMI or reset.
    Idle,
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Accumulator,
    Immediate(u8),
    Address { addr: u16, page_crossed: bool },
    Branch(u16),
}

pub struct Cpu {
    state: CpuState,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            state: CpuState::power_on(),
        }
    }

    pub fn state(&self) -> &CpuState {
        &self.state
    }

    pub fn set_state(&mut self, state: CpuState) {
        self.state = state;
        self.state.p |= FLAG_UNUSED;
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted
    }

    /// Hard reset: every register back to power-on, PC from $FFFC.
    pub fn reset(&mut self, bus: &mut dyn CpuBus) {
        self.state = CpuState::power_on();
        self.state.pc = read_u16(bus, RESET_VECTOR);
        self.state.opcode_pc = self.state.pc;
    }

    pub fn request_interrupt(&mut self, kind: InterruptKind) {
        self.state.pending.raise(kind);
    }

    pub fn set_irq_line(&mut self, asserted: bool) {
        self.state.pending.set_irq_line(asserted);
    }

    /// Advance exactly one CPU cycle.
    pub fn execute_cycle(&mut self, bus: &mut dyn CpuBus) -> CpuEvent {
        self.state.total_cycles = self.state.total_cycles.wrapping_add(1);

        if self.state.stall_cycles > 0 {
            self.state.stall_cycles -= 1;
            return CpuEvent::Stalled;
        }

        if self.state.halted {
            let wake = self.state.pending.is_pending(InterruptKind::Nmi)
                || self.state.pending.is_pending(InterruptKind::Reset);
            if !wake {
                return CpuEvent::Idle;
            }
            self.state.halted = false;
        }

        if self.state.instruction_cycle == 0 {
            if let Some(kind) = self
                .state
                .pending
                .next(self.state.flag(FLAG_INTERRUPT))
            {
                self.state.in_flight = InFlight::Interrupt(kind);
            } else {
                let pc = self.state.pc;
                let opcode = bus.read(pc);
                bus.on_instruction_fetched(pc, opcode, &self.state);
                self.state.pc = pc.wrapping_add(1);
                self.state.opcode_pc = pc;

                if !lookup(opcode).is_executable() {
                    self.state.halted = true;
                    self.state.in_flight = InFlight::Idle;
                    log::warn!("CPU halted on opcode ${opcode:02X} at ${pc:04X}");
                    return CpuEvent::Halted { pc, opcode };
                }
                self.state.in_flight = InFlight::Opcode(opcode);
            }
        }

        self.state.instruction_cycle = self.state.instruction_cycle.saturating_add(1);

        let base_cycles = self.state.in_flight.base_cycles();

        if self.state.instruction_cycle == base_cycles {
            self.state.penalty = match self.state.in_flight {
                InFlight::Opcode(opcode) => self.execute(bus, lookup(opcode)),
                InFlight::Interrupt(kind) => {
                    self.service_interrupt(bus, kind);
                    0
                }
                InFlight::Idle => 0,
            };
        }

        if self.state.instruction_cycle < base_cycles.saturating_add(self.state.penalty) {
            return CpuEvent::Busy;
        }

        let finished = self.state.in_flight;
        self.state.instruction_cycle = 0;
        self.state.penalty = 0;
        self.state.in_flight = InFlight::Idle;

        if bus.take_dma_request() {
            let odd = (self.state.total_cycles & 1) as u16;
            self.state.stall_cycles = OAM_DMA_STALL_CYCLES + odd;
            log::debug!("OAM DMA stall of {} cycles", self.state.stall_cycles);
        }

        match finished {
            InFlight::Interrupt(kind) => CpuEvent::InterruptServiced(kind),
            InFlight::Opcode(opcode) => CpuEvent::InstructionCompleted {
                pc: self.state.opcode_pc,
                opcode,
            },
            InFlight::Idle => CpuEvent::Busy,
        }
    }

    fn service_interrupt(&mut self, bus: &mut dyn CpuBus, kind: InterruptKind) {
        self.state.pending.acknowledge(kind);
        match kind {
            InterruptKind::Reset => {
                // Reset runs the push sequence with writes suppressed.
                self.state.sp = self.state.sp.wrapping_sub(3);
            }
            InterruptKind::Nmi | InterruptKind::Irq => {
                self.push_u16(bus, self.state.pc);
                let status = (self.state.p & !FLAG_BREAK) | FLAG_UNUSED;
                self.push(bus, status);
            }
        }
        self.set_flag(FLAG_INTERRUPT, true);
        self.state.pc = read_u16(bus, kind.vector());
    }

    fn fetch_byte(&mut self, bus: &mut dyn CpuBus) -> u8 {
        let byte = bus.read(self.state.pc);
        self.state.pc = self.state.pc.wrapping_add(1);
        byte
    }

    fn fetch_word(&mut self, bus: &mut dyn CpuBus) -> u16 {
        let lo = self.fetch_byte(bus) as u16;
        let hi = self.fetch_byte(bus) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut dyn CpuBus, value: u8) {
        bus.write(STACK_PAGE | self.state.sp as u16, value);
        self.state.sp = self.state.sp.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut dyn CpuBus) -> u8 {
        self.state.sp = self.state.sp.wrapping_add(1);
        bus.read(STACK_PAGE | self.state.sp as u16)
    }

    fn push_u16(&mut self, bus: &mut dyn CpuBus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop_u16(&mut self, bus: &mut dyn CpuBus) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        (hi << 8) | lo
    }

    fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.state.p |= flag;
        } else {
            self.state.p &= !flag;
        }
        self.state.p |= FLAG_UNUSED;
    }

    fn flag(&self, flag: u8) -> bool {
        self.state.flag(flag)
    }

    fn update_zn(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, value == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
    }

    /// Consumes the operand bytes and resolves the effective operand.
    fn resolve_operand(&mut self, bus: &mut dyn CpuBus, mode: AddressingMode) -> Operand {
        match mode {
            AddressingMode::Implied => Operand::None,
            AddressingMode::Accumulator => Operand::Accumulator,
            AddressingMode::Immediate => Operand::Immediate(self.fetch_byte(bus)),
            AddressingMode::ZeroPage => Operand::Address {
                addr: self.fetch_byte(bus) as u16,
                page_crossed: false,
            },
            AddressingMode::ZeroPageX => {
                let base = self.fetch_byte(bus);
                Operand::Address {
                    addr: base.wrapping_add(self.state.x) as u16,
                    page_crossed: false,
                }
            }
            AddressingMode::ZeroPageY => {
                let base = self.fetch_byte(bus);
                Operand::Address {
                    addr: base.wrapping_add(self.state.y) as u16,
                    page_crossed: false,
                }
            }
            AddressingMode::Absolute => Operand::Address {
                addr: self.fetch_word(bus),
                page_crossed: false,
            },
            AddressingMode::AbsoluteX => {
                let base = self.fetch_word(bus);
                indexed(base, self.state.x)
            }
            AddressingMode::AbsoluteY => {
                let base = self.fetch_word(bus);
                indexed(base, self.state.y)
            }
            AddressingMode::Indirect => {
                let ptr = self.fetch_word(bus);
                Operand::Address {
                    addr: read_u16_page_wrapped(bus, ptr),
                    page_crossed: false,
                }
            }
            AddressingMode::IndirectX => {
                let zp = self.fetch_byte(bus).wrapping_add(self.state.x);
                Operand::Address {
                    addr: read_zero_page_u16(bus, zp),
                    page_crossed: false,
                }
            }
            AddressingMode::IndirectY => {
                let zp = self.fetch_byte(bus);
                let base = read_zero_page_u16(bus, zp);
                indexed(base, self.state.y)
            }
            AddressingMode::Relative => {
                let offset = self.fetch_byte(bus) as i8;
                Operand::Branch(self.state.pc.wrapping_add(offset as i16 as u16))
            }
        }
    }

    fn read_operand(&mut self, bus: &mut dyn CpuBus, operand: Operand) -> u8 {
        match operand {
            Operand::Immediate(value) => value,
            Operand::Accumulator => self.state.a,
            Operand::Address { addr, page_crossed } => {
                if page_crossed {
                    // The 6502 first reads from the un-carried address.
                    let _ = bus.read(addr.wrapping_sub(0x0100));
                }
                bus.read(addr)
            }
            Operand::None | Operand::Branch(_) => 0,
        }
    }

    fn operand_address(operand: Operand) -> u16 {
        match operand {
            Operand::Address { addr, .. } => addr,
            Operand::Branch(target) => target,
            _ => 0,
        }
    }

    /// Applies one instruction. Returns the extra cycles it incurred.
    fn execute(&mut self, bus: &mut dyn CpuBus, def: &InstructionDefinition) -> u8 {
        let operand = self.resolve_operand(bus, def.mode);
        let page_penalty = match operand {
            Operand::Address {
                page_crossed: true, ..
            } if def.page_penalty => 1,
            _ => 0,
        };

        match def.mnemonic {
            Mnemonic::Lda => {
                self.state.a = self.read_operand(bus, operand);
                self.update_zn(self.state.a);
            }
            Mnemonic::Ldx => {
                self.state.x = self.read_operand(bus, operand);
                self.update_zn(self.state.x);
            }
            Mnemonic::Ldy => {
                self.state.y = self.read_operand(bus, operand);
                self.update_zn(self.state.y);
            }
            Mnemonic::Lax => {
                let value = self.read_operand(bus, operand);
                self.state.a = value;
                self.state.x = value;
                self.update_zn(value);
            }
            Mnemonic::Sta => self.store(bus, operand, self.state.a),
            Mnemonic::Stx => self.store(bus, operand, self.state.x),
            Mnemonic::Sty => self.store(bus, operand, self.state.y),
            Mnemonic::Sax => self.store(bus, operand, self.state.a & self.state.x),

            Mnemonic::Adc => {
                let value = self.read_operand(bus, operand);
                self.adc(value);
            }
            Mnemonic::Sbc => {
                let value = self.read_operand(bus, operand);
                self.sbc(value);
            }
            Mnemonic::And => {
                let value = self.read_operand(bus, operand);
                self.state.a &= value;
                self.update_zn(self.state.a);
            }
            Mnemonic::Ora => {
                let value = self.read_operand(bus, operand);
                self.state.a |= value;
                self.update_zn(self.state.a);
            }
            Mnemonic::Eor => {
                let value = self.read_operand(bus, operand);
                self.state.a ^= value;
                self.update_zn(self.state.a);
            }
            Mnemonic::Cmp => {
                let value = self.read_operand(bus, operand);
                self.compare(self.state.a, value);
            }
            Mnemonic::Cpx => {
                let value = self.read_operand(bus, operand);
                self.compare(self.state.x, value);
            }
            Mnemonic::Cpy => {
                let value = self.read_operand(bus, operand);
                self.compare(self.state.y, value);
            }
            Mnemonic::Bit => {
                let value = self.read_operand(bus, operand);
                self.set_flag(FLAG_ZERO, (self.state.a & value) == 0);
                self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
                self.set_flag(FLAG_OVERFLOW, (value & 0x40) != 0);
            }

            Mnemonic::Asl => self.modify(bus, operand, Cpu::asl),
            Mnemonic::Lsr => self.modify(bus, operand, Cpu::lsr),
            Mnemonic::Rol => self.modify(bus, operand, Cpu::rol),
            Mnemonic::Ror => self.modify(bus, operand, Cpu::ror),
            Mnemonic::Inc => self.modify(bus, operand, |cpu, value| {
                let out = value.wrapping_add(1);
                cpu.update_zn(out);
                out
            }),
            Mnemonic::Dec => self.modify(bus, operand, |cpu, value| {
                let out = value.wrapping_sub(1);
                cpu.update_zn(out);
                out
            }),
            Mnemonic::Slo => self.modify(bus, operand, |cpu, value| {
                let shifted = cpu.asl(value);
                cpu.state.a |= shifted;
                cpu.update_zn(cpu.state.a);
                shifted
            }),
            Mnemonic::Rla => self.modify(bus, operand, |cpu, value| {
                let shifted = cpu.rol(value);
                cpu.state.a &= shifted;
                cpu.update_zn(cpu.state.a);
                shifted
            }),
            Mnemonic::Sre => self.modify(bus, operand, |cpu, value| {
                let shifted = cpu.lsr(value);
                cpu.state.a ^= shifted;
                cpu.update_zn(cpu.state.a);
                shifted
            }),
            Mnemonic::Rra => self.modify(bus, operand, |cpu, value| {
                let shifted = cpu.ror(value);
                cpu.adc(shifted);
                shifted
            }),
            Mnemonic::Dcp => self.modify(bus, operand, |cpu, value| {
                let out = value.wrapping_sub(1);
                cpu.compare(cpu.state.a, out);
                out
            }),
            Mnemonic::Isc => self.modify(bus, operand, |cpu, value| {
                let out = value.wrapping_add(1);
                cpu.sbc(out);
                out
            }),

            Mnemonic::Anc => {
                let value = self.read_operand(bus, operand);
                self.state.a &= value;
                self.update_zn(self.state.a);
                self.set_flag(FLAG_CARRY, (self.state.a & 0x80) != 0);
            }
            Mnemonic::Alr => {
                let value = self.read_operand(bus, operand);
                let masked = self.state.a & value;
                self.state.a = self.lsr(masked);
            }
            Mnemonic::Arr => {
                let value = self.read_operand(bus, operand);
                let carry_in = if self.flag(FLAG_CARRY) { 0x80 } else { 0 };
                self.state.a = ((self.state.a & value) >> 1) | carry_in;
                self.update_zn(self.state.a);
                self.set_flag(FLAG_CARRY, (self.state.a & 0x40) != 0);
                let bit6 = (self.state.a >> 6) & 0x01;
                let bit5 = (self.state.a >> 5) & 0x01;
                self.set_flag(FLAG_OVERFLOW, (bit6 ^ bit5) != 0);
            }
            Mnemonic::Axs => {
                let value = self.read_operand(bus, operand);
                let ax = self.state.a & self.state.x;
                self.set_flag(FLAG_CARRY, ax >= value);
                self.state.x = ax.wrapping_sub(value);
                self.update_zn(self.state.x);
            }

            Mnemonic::Inx => {
                self.state.x = self.state.x.wrapping_add(1);
                self.update_zn(self.state.x);
            }
            Mnemonic::Iny => {
                self.state.y = self.state.y.wrapping_add(1);
                self.update_zn(self.state.y);
            }
            Mnemonic::Dex => {
                self.state.x = self.state.x.wrapping_sub(1);
                self.update_zn(self.state.x);
            }
            Mnemonic::Dey => {
                self.state.y = self.state.y.wrapping_sub(1);
                self.update_zn(self.state.y);
            }
            Mnemonic::Tax => {
                self.state.x = self.state.a;
                self.update_zn(self.state.x);
            }
            Mnemonic::Tay => {
                self.state.y = self.state.a;
                self.update_zn(self.state.y);
            }
            Mnemonic::Txa => {
                self.state.a = self.state.x;
                self.update_zn(self.state.a);
            }
            Mnemonic::Tya => {
                self.state.a = self.state.y;
                self.update_zn(self.state.a);
            }
            Mnemonic::Tsx => {
                self.state.x = self.state.sp;
                self.update_zn(self.state.x);
            }
            Mnemonic::Txs => self.state.sp = self.state.x,

            Mnemonic::Clc => self.set_flag(FLAG_CARRY, false),
            Mnemonic::Sec => self.set_flag(FLAG_CARRY, true),
            Mnemonic::Cli => self.set_flag(FLAG_INTERRUPT, false),
            Mnemonic::Sei => self.set_flag(FLAG_INTERRUPT, true),
            Mnemonic::Clv => self.set_flag(FLAG_OVERFLOW, false),
            Mnemonic::Cld => self.set_flag(FLAG_DECIMAL, false),
            Mnemonic::Sed => self.set_flag(FLAG_DECIMAL, true),

            Mnemonic::Pha => self.push(bus, self.state.a),
            Mnemonic::Php => self.push(bus, self.state.p | FLAG_BREAK | FLAG_UNUSED),
            Mnemonic::Pla => {
                self.state.a = self.pop(bus);
                self.update_zn(self.state.a);
            }
            Mnemonic::Plp => {
                let value = self.pop(bus);
                self.state.p = (value & !FLAG_BREAK) | FLAG_UNUSED;
            }

            Mnemonic::Jmp => self.state.pc = Self::operand_address(operand),
            Mnemonic::Jsr => {
                let target = Self::operand_address(operand);
                self.push_u16(bus, self.state.pc.wrapping_sub(1));
                self.state.pc = target;
            }
            Mnemonic::Rts => {
                self.state.pc = self.pop_u16(bus).wrapping_add(1);
            }
            Mnemonic::Rti => {
                let value = self.pop(bus);
                self.state.p = (value & !FLAG_BREAK) | FLAG_UNUSED;
                self.state.pc = self.pop_u16(bus);
            }
            Mnemonic::Brk => {
                // Skip the signature byte.
                self.state.pc = self.state.pc.wrapping_add(1);
                self.push_u16(bus, self.state.pc);
                self.push(bus, self.state.p | FLAG_BREAK | FLAG_UNUSED);
                self.set_flag(FLAG_INTERRUPT, true);
                self.state.pc = read_u16(bus, InterruptKind::Irq.vector());
            }

            Mnemonic::Bpl => return self.branch(operand, !self.flag(FLAG_NEGATIVE)),
            Mnemonic::Bmi => return self.branch(operand, self.flag(FLAG_NEGATIVE)),
            Mnemonic::Bvc => return self.branch(operand, !self.flag(FLAG_OVERFLOW)),
            Mnemonic::Bvs => return self.branch(operand, self.flag(FLAG_OVERFLOW)),
            Mnemonic::Bcc => return self.branch(operand, !self.flag(FLAG_CARRY)),
            Mnemonic::Bcs => return self.branch(operand, self.flag(FLAG_CARRY)),
            Mnemonic::Bne => return self.branch(operand, !self.flag(FLAG_ZERO)),
            Mnemonic::Beq => return self.branch(operand, self.flag(FLAG_ZERO)),

            Mnemonic::Nop => {
                if matches!(operand, Operand::Address { .. }) {
                    let _ = self.read_operand(bus, operand);
                }
            }

            // Filtered out by `is_executable` before dispatch.
            Mnemonic::Jam | Mnemonic::Unstable => {}
        }

        page_penalty
    }

    fn store(&mut self, bus: &mut dyn CpuBus, operand: Operand, value: u8) {
        if let Operand::Address { addr, page_crossed } = operand {
            if page_crossed {
                let _ = bus.read(addr.wrapping_sub(0x0100));
            }
            bus.write(addr, value);
        }
    }

    fn modify(&mut self, bus: &mut dyn CpuBus, operand: Operand, op: fn(&mut Cpu, u8) -> u8) {
        match operand {
            Operand::Accumulator => {
                let value = self.state.a;
                self.state.a = op(self, value);
            }
            Operand::Address { addr, .. } => {
                let value = bus.read(addr);
                // Read-modify-write stores the unmodified value first.
                bus.write(addr, value);
                let out = op(self, value);
                bus.write(addr, out);
            }
            _ => {}
        }
    }

    fn branch(&mut self, operand: Operand, condition: bool) -> u8 {
        if !condition {
            return 0;
        }
        let target = Self::operand_address(operand);
        let from = self.state.pc;
        self.state.pc = target;
        if (from & 0xFF00) != (target & 0xFF00) {
            2
        } else {
            1
        }
    }

    fn compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.set_flag(FLAG_CARRY, register >= value);
        self.update_zn(result);
    }

    // Binary only: the 2A03 has no decimal mode even with D set.
    fn adc(&mut self, value: u8) {
        let carry_in = u16::from(self.flag(FLAG_CARRY));
        let a = self.state.a;
        let sum = a as u16 + value as u16 + carry_in;
        let result = sum as u8;

        self.set_flag(FLAG_CARRY, sum > 0xFF);
        self.set_flag(FLAG_OVERFLOW, (!(a ^ value) & (a ^ result) & 0x80) != 0);
        self.state.a = result;
        self.update_zn(result);
    }

    fn sbc(&mut self, value: u8) {
        let borrow = u16::from(!self.flag(FLAG_CARRY));
        let a = self.state.a;
        let diff = (a as u16).wrapping_sub(value as u16).wrapping_sub(borrow);
        let result = diff as u8;

        self.set_flag(FLAG_CARRY, diff < 0x100);
        self.set_flag(FLAG_OVERFLOW, ((a ^ value) & (a ^ result) & 0x80) != 0);
        self.state.a = result;
        self.update_zn(result);
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = value << 1;
        self.update_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = value >> 1;
        self.update_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.flag(FLAG_CARRY));
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = (value << 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = if self.flag(FLAG_CARRY) { 0x80 } else { 0 };
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = (value >> 1) | carry_in;
        self.update_zn(result);
        result
    }
}

impl ClockedComponent for Cpu {
    type Bus = dyn CpuBus;
    type State = CpuState;
    type Event = CpuEvent;

    fn execute_cycle(&mut self, bus: &mut Self::Bus) -> CpuEvent {
        Cpu::execute_cycle(self, bus)
    }

    fn reset(&mut self, bus: &mut Self::Bus) {
        Cpu::reset(self, bus);
    }

    fn state(&self) -> CpuState {
        self.state
    }

    fn set_state(&mut self, state: CpuState) {
        Cpu::set_state(self, state);
    }
}

fn indexed(base: u16, index: u8) -> Operand {
    let addr = base.wrapping_add(index as u16);
    Operand::Address {
        addr,
        page_crossed: (base & 0xFF00) != (addr & 0xFF00),
    }
}

pub(crate) fn read_u16(bus: &mut dyn CpuBus, addr: u16) -> u16 {
    let lo = bus.read(addr) as u16;
    let hi = bus.read(addr.wrapping_add(1)) as u16;
    (hi << 8) | lo
}

/// `JMP ($xxFF)` fetches the high byte from `$xx00`, not the next page.
fn read_u16_page_wrapped(bus: &mut dyn CpuBus, ptr: u16) -> u16 {
    let lo = bus.read(ptr) as u16;
    let hi_addr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
    let hi = bus.read(hi_addr) as u16;
    (hi << 8) | lo
}

fn read_zero_page_u16(bus: &mut dyn CpuBus, zp: u8) -> u16 {
    let lo = bus.read(zp as u16) as u16;
    let hi = bus.read(zp.wrapping_add(1) as u16) as u16;
    (hi << 8) | lo
}
