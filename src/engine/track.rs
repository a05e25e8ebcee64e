// src/engine/track.rs

use crate::error::{EngineError, EngineResult};

pub const MAX_CLIPS_PER_TRACK: usize = 128;

/// Track names are bounded so foreign embedders can mirror them in a fixed
/// 64-byte field.
pub const MAX_NAME_BYTES: usize = 63;

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 2.0;

/// Truncate a name to the 63-byte bound, backing off to a UTF-8 character
/// boundary so no codepoint is ever split.
pub fn bounded_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_BYTES {
        return name;
    }
    let mut end = MAX_NAME_BYTES;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Track kind. Only audio tracks feed the mixer; the other kinds exist for
/// API parity and stay inert. Discriminants cross the C surface unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TrackKind {
    Audio = 0,
    Midi = 1,
    Bus = 2,
    Master = 3,
}

impl TrackKind {
    pub fn display_name(self) -> &'static str {
        match self {
            TrackKind::Audio => "Audio",
            TrackKind::Midi => "MIDI",
            TrackKind::Bus => "Bus",
            TrackKind::Master => "Master",
        }
    }

    /// Unknown raw values collapse to Audio.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => TrackKind::Midi,
            2 => TrackKind::Bus,
            3 => TrackKind::Master,
            _ => TrackKind::Audio,
        }
    }
}

/// An immutable block of deinterleaved PCM placed on the musical timeline.
/// `len_beats` is fixed at load time from the then-current BPM; later tempo
/// changes re-place the audio rather than stretch it.
pub struct Clip {
    left: Vec<f32>,
    right: Vec<f32>,
    pub start_beat: f64,
    pub len_beats: f64,
    pub active: bool,
}

impl Clip {
    pub fn new(left: Vec<f32>, right: Vec<f32>, start_beat: f64, len_beats: f64) -> Self {
        debug_assert_eq!(left.len(), right.len());
        debug_assert!(!left.is_empty());
        debug_assert!(len_beats > 0.0);
        debug_assert!(start_beat >= 0.0);
        Self {
            left,
            right,
            start_beat,
            len_beats,
            active: true,
        }
    }

    pub fn n_frames(&self) -> usize {
        self.left.len()
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.len_beats
    }
}

/// One mixer lane: clips plus the mix parameters the callback reads.
pub struct Track {
    pub id: u32,
    pub kind: TrackKind,
    pub name: String,
    pub volume: f32,
    pub pan: f32, // -1.0 left, 0 center, +1.0 right
    pub muted: bool,
    pub soloed: bool,
    pub armed: bool,
    pub peak_l: f32,
    pub peak_r: f32,
    clips: Vec<Clip>,
}

impl Track {
    pub fn new(id: u32, kind: TrackKind, name: String) -> Self {
        Self {
            id,
            kind,
            name,
            volume: 1.0,
            pan: 0.0,
            muted: false,
            soloed: false,
            armed: false,
            peak_l: 0.0,
            peak_r: 0.0,
            clips: Vec::new(),
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(MIN_VOLUME, MAX_VOLUME);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn clip_count(&self) -> u32 {
        self.clips.len() as u32
    }

    pub fn has_clip_capacity(&self) -> bool {
        self.clips.len() < MAX_CLIPS_PER_TRACK
    }

    pub fn add_clip(&mut self, clip: Clip) -> EngineResult<()> {
        if !self.has_clip_capacity() {
            return Err(EngineError::ClipFull);
        }
        self.clips.push(clip);
        Ok(())
    }
}
