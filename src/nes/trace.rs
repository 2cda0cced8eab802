use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use super::cpu::CpuState;
use super::opcodes::{AddressingMode, lookup};

/// Optional observer installed on the bus.
///
/// Both callbacks default to no-ops so a hook can subscribe to just one of
/// them. They fire for every ROM; nothing is keyed to particular addresses.
pub trait TraceHook {
    /// Called on each opcode fetch. `state` is the register file before the
    /// instruction runs.
    fn on_instruction_fetched(&mut self, _pc: u16, _opcode: u8, _state: &CpuState) {}

    /// Called after every CPU access to $2000-$3FFF or $4000-$401F.
    fn on_register_access(&mut self, _addr: u16, _value: u8, _is_write: bool) {}
}

/// Records nestest-style lines into a bounded shared buffer.
///
/// Cloning gives another handle onto the same buffer, so a host can keep one
/// clone and install the other on the bus.
#[derive(Clone)]
pub struct TraceRecorder {
    lines: Rc<RefCell<VecDeque<String>>>,
    capacity: usize,
    record_registers: bool,
}

impl TraceRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Rc::new(RefCell::new(VecDeque::with_capacity(capacity.min(4096)))),
            capacity: capacity.max(1),
            record_registers: false,
        }
    }

    pub fn with_register_access(mut self, enabled: bool) -> Self {
        self.record_registers = enabled;
        self
    }

    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }

    /// Oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().iter().cloned().collect()
    }

    pub fn take_lines(&self) -> Vec<String> {
        self.lines.borrow_mut().drain(..).collect()
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.borrow_mut();
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

impl TraceHook for TraceRecorder {
    fn on_instruction_fetched(&mut self, pc: u16, opcode: u8, state: &CpuState) {
        let def = lookup(opcode);
        self.push(format!(
            "{pc:04X}  {opcode:02X} {}{:<4}{:<6} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} CYC:{}",
            if def.is_official() { ' ' } else { '*' },
            def.mnemonic.name(),
            mode_suffix(def.mode),
            state.a,
            state.x,
            state.y,
            state.p,
            state.sp,
            state.total_cycles
        ));
    }

    fn on_register_access(&mut self, addr: u16, value: u8, is_write: bool) {
        if !self.record_registers {
            return;
        }
        let dir = if is_write { "W" } else { "R" };
        self.push(format!("      {dir} ${addr:04X} = ${value:02X}"));
    }
}

fn mode_suffix(mode: AddressingMode) -> &'static str {
    match mode {
        AddressingMode::Implied => "",
        AddressingMode::Accumulator => "A",
        AddressingMode::Immediate => "#imm",
        AddressingMode::ZeroPage => "zp",
        AddressingMode::ZeroPageX => "zp,X",
        AddressingMode::ZeroPageY => "zp,Y",
        AddressingMode::Absolute => "abs",
        AddressingMode::AbsoluteX => "abs,X",
        AddressingMode::AbsoluteY => "abs,Y",
        AddressingMode::Indirect => "(ind)",
        AddressingMode::IndirectX => "(zp,X)",
        AddressingMode::IndirectY => "(zp),Y",
        AddressingMode::Relative => "rel",
    }
}
