// src/engine/transport.rs

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 1.0;
pub const MAX_BPM: f64 = 999.0;

/// Beats per bar. The engine assumes 4/4 throughout.
const BEATS_PER_BAR: f64 = 4.0;

/// Transport run state. Discriminants cross the C surface unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TransportState {
    Stopped = 0,
    Playing = 1,
    Recording = 2,
    Paused = 3,
}

impl TransportState {
    /// Recording mixes exactly like playing; capture itself lives elsewhere.
    pub fn is_rolling(self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Recording)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoopRegion {
    pub enabled: bool,
    pub start_beat: f64,
    pub end_beat: f64,
}

/// Musical playhead: position is tracked in beats and seconds, kept in sync
/// on every write. Seconds are always `beats * 60 / bpm`.
#[derive(Clone, Copy, Debug)]
pub struct Transport {
    pub state: TransportState,
    pub bpm: f64,
    pub position_beats: f64,
    pub position_seconds: f64,
    pub looping: LoopRegion,
}

impl Transport {
    pub fn new(bpm: f64) -> Self {
        Self {
            state: TransportState::Stopped,
            bpm,
            position_beats: 0.0,
            position_seconds: 0.0,
            looping: LoopRegion::default(),
        }
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn play(&mut self) {
        self.state = TransportState::Playing;
    }

    /// Stop also rewinds the playhead.
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.position_beats = 0.0;
        self.position_seconds = 0.0;
    }

    /// Pause only takes effect while playing; anything else is a no-op.
    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
        }
    }

    pub fn record(&mut self) {
        self.state = TransportState::Recording;
    }

    pub fn seek(&mut self, beat: f64) -> EngineResult<()> {
        if !(beat >= 0.0) {
            return Err(EngineError::InvalidParam("seek beat must be >= 0"));
        }
        self.position_beats = beat;
        self.position_seconds = beat * self.seconds_per_beat();
        Ok(())
    }

    pub fn set_bpm(&mut self, bpm: f64) -> EngineResult<()> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(EngineError::InvalidParam("bpm out of range"));
        }
        self.bpm = bpm;
        Ok(())
    }

    pub fn set_loop(&mut self, enabled: bool, start_beat: f64, end_beat: f64) -> EngineResult<()> {
        if !(end_beat > start_beat) {
            return Err(EngineError::InvalidParam("loop end must be after start"));
        }
        self.looping = LoopRegion {
            enabled,
            start_beat,
            end_beat,
        };
        Ok(())
    }

    /// Advance the playhead by a rendered block and snap back to the loop
    /// start once the position crosses the loop end.
    pub fn advance(&mut self, delta_seconds: f64) {
        self.position_seconds += delta_seconds;
        self.position_beats += delta_seconds / self.seconds_per_beat();

        if self.looping.enabled && self.position_beats >= self.looping.end_beat {
            self.position_beats = self.looping.start_beat;
            self.position_seconds = self.looping.start_beat * self.seconds_per_beat();
        }
    }

    /// 1-based bar number, 4/4 assumed.
    pub fn bar(&self) -> u32 {
        (self.position_beats / BEATS_PER_BAR) as u32 + 1
    }

    /// 1-based beat within the current bar.
    pub fn beat_in_bar(&self) -> u32 {
        (self.position_beats % BEATS_PER_BAR) as u32 + 1
    }
}
