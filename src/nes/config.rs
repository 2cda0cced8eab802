use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::clock::TimingMode;

pub const DEFAULT_DEBUG_EVENT_CAPACITY: usize = 512;
/// A little over two NTSC frames of master ticks.
pub const DEFAULT_FRAME_CYCLE_GUARD: u64 = 200_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NesConfig {
    pub timing_mode: TimingMode,
    /// Fill `FrameCompleted::elapsed` from the wall clock.
    pub track_wall_time: bool,
    pub debug_event_capacity: usize,
    /// Most master ticks `run_frame` spends before giving up.
    pub frame_cycle_guard: u64,
}

impl Default for NesConfig {
    fn default() -> Self {
        Self {
            timing_mode: TimingMode::Ntsc,
            track_wall_time: false,
            debug_event_capacity: DEFAULT_DEBUG_EVENT_CAPACITY,
            frame_cycle_guard: DEFAULT_FRAME_CYCLE_GUARD,
        }
    }
}

impl NesConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid emulator config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = NesConfig::from_json_str(r#"{ "timing_mode": "pal" }"#).unwrap();
        assert_eq!(config.timing_mode, TimingMode::Pal);
        assert_eq!(config.debug_event_capacity, DEFAULT_DEBUG_EVENT_CAPACITY);
        assert_eq!(config.frame_cycle_guard, DEFAULT_FRAME_CYCLE_GUARD);
        assert!(!config.track_wall_time);
    }

    #[test]
    fn rejects_unknown_timing_mode() {
        assert!(NesConfig::from_json_str(r#"{ "timing_mode": "secam" }"#).is_err());
    }
}
