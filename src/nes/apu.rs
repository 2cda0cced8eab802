//! APU register block.
//!
//! Holds the channel register latches, the length counters that `$4015`
//! reports, and the frame sequencer that drives them and raises the frame
//! IRQ. Waveform synthesis is not modelled.

use super::clock::ClockedComponent;

const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

const FC_4STEP_Q1: u32 = 7_457;
const FC_4STEP_Q2_H2: u32 = 14_913;
const FC_4STEP_Q3: u32 = 22_371;
const FC_4STEP_Q4_H4_IRQ: u32 = 29_829;
const FC_4STEP_RESET: u32 = 29_830;

const FC_5STEP_Q4_H4: u32 = 37_281;
const FC_5STEP_RESET: u32 = 37_282;

const CHANNELS: usize = 4;
/// Register that reloads each channel's length counter.
const LENGTH_LOAD_REGISTERS: [u16; CHANNELS] = [0x4003, 0x4007, 0x400B, 0x400F];

const STATUS_FRAME_IRQ: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApuState {
    /// Last value written to each of $4000-$4017.
    pub registers: [u8; 0x18],
    pub length_counters: [u8; CHANNELS],
    pub enabled: u8,
    pub frame_counter: u32,
    pub five_step: bool,
    pub irq_inhibit: bool,
    pub frame_irq: bool,
    /// A $4017 write waiting to take effect, with its remaining delay.
    pub pending_frame_write: Option<(u8, u8)>,
    pub cpu_cycle: u64,
}

impl Default for ApuState {
    fn default() -> Self {
        Self {
            registers: [0; 0x18],
            length_counters: [0; CHANNELS],
            enabled: 0,
            frame_counter: 0,
            five_step: false,
            irq_inhibit: false,
            frame_irq: false,
            pending_frame_write: None,
            cpu_cycle: 0,
        }
    }
}

#[derive(Default)]
pub struct Apu {
    state: ApuState,
}

impl Apu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ApuState {
        &self.state
    }

    pub fn set_state(&mut self, state: ApuState) {
        self.state = state;
    }

    pub fn reset(&mut self) {
        self.state = ApuState::default();
    }

    pub fn irq_pending(&self) -> bool {
        self.state.frame_irq
    }

    pub fn write_register(&mut self, addr: u16, value: u8) {
        let index = (addr - 0x4000) as usize;
        if index >= self.state.registers.len() {
            return;
        }
        self.state.registers[index] = value;

        match addr {
            0x4015 => {
                self.state.enabled = value & 0x1F;
                for channel in 0..CHANNELS {
                    if (value & (1 << channel)) == 0 {
                        self.state.length_counters[channel] = 0;
                    }
                }
            }
            0x4017 => {
                if (value & 0x40) != 0 {
                    self.state.frame_irq = false;
                }
                let delay = if (self.state.cpu_cycle & 1) == 0 { 3 } else { 4 };
                self.state.pending_frame_write = Some((value, delay));
            }
            _ => {
                if let Some(channel) = LENGTH_LOAD_REGISTERS.iter().position(|&r| r == addr)
                    && (self.state.enabled & (1 << channel)) != 0
                {
                    self.state.length_counters[channel] = LENGTH_TABLE[(value >> 3) as usize];
                }
            }
        }
    }

    /// `$4015` read: length-counter status plus frame IRQ, which the read acknowledges.
    pub fn read_status(&mut self) -> u8 {
        let mut status = 0u8;
        for (channel, &length) in self.state.length_counters.iter().enumerate() {
            if length > 0 {
                status |= 1 << channel;
            }
        }
        if self.state.frame_irq {
            status |= STATUS_FRAME_IRQ;
        }
        self.state.frame_irq = false;
        status
    }

    pub fn peek_status(&self) -> u8 {
        let mut status = 0u8;
        for (channel, &length) in self.state.length_counters.iter().enumerate() {
            if length > 0 {
                status |= 1 << channel;
            }
        }
        if self.state.frame_irq {
            status |= STATUS_FRAME_IRQ;
        }
        status
    }

    /// Advance one CPU cycle. Returns the frame IRQ level.
    pub fn execute_cycle(&mut self) -> bool {
        self.state.cpu_cycle = self.state.cpu_cycle.wrapping_add(1);

        if let Some((value, delay)) = self.state.pending_frame_write {
            if delay <= 1 {
                self.state.pending_frame_write = None;
                self.apply_frame_counter_write(value);
            } else {
                self.state.pending_frame_write = Some((value, delay - 1));
            }
        }

        self.clock_frame_counter();
        self.state.frame_irq
    }

    fn apply_frame_counter_write(&mut self, value: u8) {
        self.state.five_step = (value & 0x80) != 0;
        self.state.irq_inhibit = (value & 0x40) != 0;
        if self.state.irq_inhibit {
            self.state.frame_irq = false;
        }
        self.state.frame_counter = 0;
        if self.state.five_step {
            self.clock_half_frame();
        }
    }

    fn clock_frame_counter(&mut self) {
        self.state.frame_counter += 1;
        let step = self.state.frame_counter;

        if self.state.five_step {
            match step {
                FC_4STEP_Q2_H2 | FC_5STEP_Q4_H4 => self.clock_half_frame(),
                FC_5STEP_RESET => self.state.frame_counter = 0,
                _ => {}
            }
            return;
        }

        match step {
            FC_4STEP_Q1 | FC_4STEP_Q3 => {}
            FC_4STEP_Q2_H2 => self.clock_half_frame(),
            FC_4STEP_Q4_H4_IRQ => {
                self.clock_half_frame();
                self.raise_frame_irq();
            }
            FC_4STEP_RESET => {
                self.raise_frame_irq();
                self.state.frame_counter = 0;
            }
            _ => {}
        }
    }

    fn raise_frame_irq(&mut self) {
        if !self.state.irq_inhibit {
            self.state.frame_irq = true;
        }
    }

    fn length_halted(&self, channel: usize) -> bool {
        let regs = &self.state.registers;
        match channel {
            // Triangle uses its linear-counter control bit.
            2 => (regs[0x08] & 0x80) != 0,
            _ => (regs[channel * 4] & 0x20) != 0,
        }
    }

    fn clock_half_frame(&mut self) {
        for channel in 0..CHANNELS {
            if !self.length_halted(channel) && self.state.length_counters[channel] > 0 {
                self.state.length_counters[channel] -= 1;
            }
        }
    }
}

impl ClockedComponent for Apu {
    type Bus = ();
    type State = ApuState;
    type Event = bool;

    fn execute_cycle(&mut self, _bus: &mut ()) -> bool {
        Apu::execute_cycle(self)
    }

    fn reset(&mut self, _bus: &mut ()) {
        Apu::reset(self);
    }

    fn state(&self) -> ApuState {
        self.state
    }

    fn set_state(&mut self, state: ApuState) {
        Apu::set_state(self, state);
    }
}
