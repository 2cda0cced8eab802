//! Master clock and lock-step sequencing.
//!
//! The coordinator owns the master cycle counter and, on every tick, tells
//! the host how many cycles each registered component owes. It holds no
//! instruction or rendering logic.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A component advanced one of its own cycles at a time.
pub trait ClockedComponent {
    /// What the component talks to while it runs.
    type Bus: ?Sized;
    type State;
    type Event;

    fn execute_cycle(&mut self, bus: &mut Self::Bus) -> Self::Event;
    fn reset(&mut self, bus: &mut Self::Bus);
    fn state(&self) -> Self::State;
    fn set_state(&mut self, state: Self::State);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    #[default]
    Ntsc,
    Pal,
}

impl TimingMode {
    /// PPU dots per CPU cycle as `(numerator, denominator)`.
    pub const fn ppu_ratio(self) -> (u32, u32) {
        match self {
            TimingMode::Ntsc => (3, 1),
            TimingMode::Pal => (16, 5),
        }
    }

    pub(crate) const fn to_byte(self) -> u8 {
        match self {
            TimingMode::Ntsc => 0,
            TimingMode::Pal => 1,
        }
    }

    pub(crate) const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(TimingMode::Ntsc),
            1 => Some(TimingMode::Pal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    Cpu,
    Ppu,
    Apu,
}

pub const COMPONENT_COUNT: usize = 3;

impl ComponentId {
    const ALL: [ComponentId; COMPONENT_COUNT] =
        [ComponentId::Cpu, ComponentId::Ppu, ComponentId::Apu];

    const fn index(self) -> usize {
        match self {
            ComponentId::Cpu => 0,
            ComponentId::Ppu => 1,
            ComponentId::Apu => 2,
        }
    }

    /// Component cycles per master tick as `(numerator, denominator)`.
    const fn ratio(self, mode: TimingMode) -> (u32, u32) {
        match self {
            ComponentId::Ppu => mode.ppu_ratio(),
            ComponentId::Cpu | ComponentId::Apu => (1, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingState {
    pub master_cycle: u64,
    pub mode: TimingMode,
    pub running: bool,
    /// Fractional cycles carried between ticks, per component, in units of
    /// the ratio denominator.
    pub remainders: [u32; COMPONENT_COUNT],
}

impl TimingState {
    /// Every carried remainder is below its component's ratio denominator.
    pub(crate) fn remainders_in_range(&self) -> bool {
        ComponentId::ALL
            .iter()
            .all(|c| self.remainders[c.index()] < c.ratio(self.mode).1)
    }
}

impl Default for TimingState {
    fn default() -> Self {
        Self {
            master_cycle: 0,
            mode: TimingMode::Ntsc,
            running: true,
            remainders: [0; COMPONENT_COUNT],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCompleted {
    pub frame: u64,
    pub master_cycle: u64,
    /// Wall time since the previous frame, when tracking is enabled.
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halt {
    pub pc: u16,
    pub opcode: u8,
}

/// Everything observable that happened during one or more ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockEvents {
    pub instructions_completed: u32,
    pub interrupts_serviced: u32,
    pub vblank_started: u32,
    pub vblank_ended: u32,
    pub nmi_edges: u32,
    pub frames_completed: u32,
    /// Most recent frame boundary.
    pub frame: Option<FrameCompleted>,
    pub halted: Option<Halt>,
}

impl ClockEvents {
    pub fn merge(&mut self, other: ClockEvents) {
        self.instructions_completed += other.instructions_completed;
        self.interrupts_serviced += other.interrupts_serviced;
        self.vblank_started += other.vblank_started;
        self.vblank_ended += other.vblank_ended;
        self.nmi_edges += other.nmi_edges;
        self.frames_completed += other.frames_completed;
        if other.frame.is_some() {
            self.frame = other.frame;
        }
        if other.halted.is_some() {
            self.halted = other.halted;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ClockEvents::default()
    }
}

/// Owner of the clocked components.
pub trait ClockHost {
    /// Run `component` for `cycles` of its own clock during master tick
    /// `master_cycle`.
    fn synchronize_clock(
        &mut self,
        component: ComponentId,
        cycles: u32,
        master_cycle: u64,
    ) -> ClockEvents;
}

pub struct TimingCoordinator {
    state: TimingState,
    components: Vec<ComponentId>,
    track_wall_time: bool,
    frame_timer: Option<Instant>,
}

impl TimingCoordinator {
    pub fn new(mode: TimingMode, track_wall_time: bool) -> Self {
        Self {
            state: TimingState {
                mode,
                ..TimingState::default()
            },
            components: Vec::with_capacity(COMPONENT_COUNT),
            track_wall_time,
            frame_timer: None,
        }
    }

    pub fn state(&self) -> &TimingState {
        &self.state
    }

    pub(crate) fn set_state(&mut self, state: TimingState) {
        self.state = state;
        self.frame_timer = None;
    }

    pub fn master_cycle(&self) -> u64 {
        self.state.master_cycle
    }

    pub fn timing_mode(&self) -> TimingMode {
        self.state.mode
    }

    /// Components are synchronized in registration order.
    pub fn register_component(&mut self, component: ComponentId) {
        if !self.components.contains(&component) {
            self.components.push(component);
        }
    }

    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn set_running(&mut self, running: bool) {
        self.state.running = running;
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn reset(&mut self) {
        self.state = TimingState {
            mode: self.state.mode,
            ..TimingState::default()
        };
        self.frame_timer = None;
    }

    pub fn set_timing_mode(&mut self, mode: TimingMode) {
        if self.state.mode != mode {
            log::debug!("timing mode {:?} -> {:?}", self.state.mode, mode);
        }
        self.state.mode = mode;
        self.state.remainders = [0; COMPONENT_COUNT];
    }

    /// One master tick. A stopped coordinator does nothing.
    pub fn execute_cycle(&mut self, host: &mut dyn ClockHost) -> ClockEvents {
        let mut events = ClockEvents::default();
        if !self.state.running {
            return events;
        }
        if self.track_wall_time && self.frame_timer.is_none() {
            self.frame_timer = Some(Instant::now());
        }

        self.state.master_cycle += 1;
        let master_cycle = self.state.master_cycle;

        for &component in &self.components {
            let (num, den) = component.ratio(self.state.mode);
            let owed = &mut self.state.remainders[component.index()];
            *owed += num;
            let cycles = *owed / den;
            *owed %= den;
            if cycles > 0 {
                events.merge(host.synchronize_clock(component, cycles, master_cycle));
            }
        }

        if let Some(frame) = events.frame.as_mut()
            && let Some(started) = self.frame_timer
        {
            frame.elapsed = Some(started.elapsed());
            self.frame_timer = Some(Instant::now());
        }
        events
    }

    pub fn execute_cycles(&mut self, host: &mut dyn ClockHost, cycles: u64) -> ClockEvents {
        let mut events = ClockEvents::default();
        for _ in 0..cycles {
            events.merge(self.execute_cycle(host));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingHost {
        calls: Vec<(ComponentId, u32, u64)>,
        frame_every: u64,
    }

    impl CountingHost {
        fn total(&self, component: ComponentId) -> u32 {
            self.calls
                .iter()
                .filter(|(c, _, _)| *c == component)
                .map(|(_, n, _)| n)
                .sum()
        }
    }

    impl ClockHost for CountingHost {
        fn synchronize_clock(
            &mut self,
            component: ComponentId,
            cycles: u32,
            master_cycle: u64,
        ) -> ClockEvents {
            self.calls.push((component, cycles, master_cycle));
            let mut events = ClockEvents::default();
            if component == ComponentId::Ppu
                && self.frame_every != 0
                && master_cycle % self.frame_every == 0
            {
                events.frames_completed = 1;
                events.frame = Some(FrameCompleted {
                    frame: master_cycle / self.frame_every,
                    master_cycle,
                    elapsed: None,
                });
            }
            events
        }
    }

    fn coordinator(mode: TimingMode) -> TimingCoordinator {
        let mut clock = TimingCoordinator::new(mode, false);
        clock.register_component(ComponentId::Cpu);
        clock.register_component(ComponentId::Ppu);
        clock.register_component(ComponentId::Apu);
        clock
    }

    #[test]
    fn ntsc_runs_three_dots_per_cpu_cycle_in_order() {
        let mut clock = coordinator(TimingMode::Ntsc);
        let mut host = CountingHost::default();
        clock.execute_cycle(&mut host);
        assert_eq!(
            host.calls,
            vec![
                (ComponentId::Cpu, 1, 1),
                (ComponentId::Ppu, 3, 1),
                (ComponentId::Apu, 1, 1)
            ]
        );
        assert_eq!(clock.master_cycle(), 1);
    }

    #[test]
    fn pal_accumulates_sixteen_dots_per_five_cycles() {
        let mut clock = coordinator(TimingMode::Pal);
        let mut host = CountingHost::default();
        clock.execute_cycles(&mut host, 5);
        assert_eq!(host.total(ComponentId::Ppu), 16);
        assert_eq!(host.total(ComponentId::Cpu), 5);
        assert_eq!(clock.state().remainders, [0; COMPONENT_COUNT]);
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let mut clock = coordinator(TimingMode::Ntsc);
        clock.register_component(ComponentId::Cpu);
        assert_eq!(clock.components().len(), 3);
    }

    #[test]
    fn stopped_coordinator_does_not_tick() {
        let mut clock = coordinator(TimingMode::Ntsc);
        let mut host = CountingHost::default();
        clock.set_running(false);
        assert!(clock.execute_cycle(&mut host).is_empty());
        assert_eq!(clock.master_cycle(), 0);
        assert!(host.calls.is_empty());
    }

    #[test]
    fn merged_events_keep_latest_frame() {
        let mut clock = coordinator(TimingMode::Ntsc);
        let mut host = CountingHost {
            frame_every: 4,
            ..CountingHost::default()
        };
        let events = clock.execute_cycles(&mut host, 10);
        assert_eq!(events.frames_completed, 2);
        let frame = events.frame.unwrap();
        assert_eq!(frame.frame, 2);
        assert_eq!(frame.master_cycle, 8);
        assert!(frame.elapsed.is_none());
    }

    #[test]
    fn wall_time_is_reported_when_tracked() {
        let mut clock = TimingCoordinator::new(TimingMode::Ntsc, true);
        clock.register_component(ComponentId::Ppu);
        let mut host = CountingHost {
            frame_every: 2,
            ..CountingHost::default()
        };
        let events = clock.execute_cycles(&mut host, 2);
        assert!(events.frame.unwrap().elapsed.is_some());
    }

    #[test]
    fn reset_keeps_mode_and_clears_counters() {
        let mut clock = coordinator(TimingMode::Ntsc);
        let mut host = CountingHost::default();
        clock.set_timing_mode(TimingMode::Pal);
        clock.execute_cycles(&mut host, 3);
        clock.reset();
        assert_eq!(clock.master_cycle(), 0);
        assert_eq!(clock.timing_mode(), TimingMode::Pal);
        assert!(clock.is_running());
    }
}
