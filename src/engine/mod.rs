// src/engine/mod.rs

pub mod metering;
pub mod mixer;
pub mod track;
pub mod transport;

pub use metering::MasterMeters;
pub use track::{Clip, Track, TrackKind, MAX_CLIPS_PER_TRACK};
pub use transport::{LoopRegion, Transport, TransportState};

use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use metering::PeakFollower;
use mixer::{BlockTiming, MixBus};
use track::{MAX_VOLUME, MIN_VOLUME};

pub const MAX_TRACKS: usize = 64;
pub const CHANNELS: usize = 2;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_BIT_DEPTH: u32 = 24;
pub const DEFAULT_BUFFER_FRAMES: u32 = 512;

/// Settings fixed at engine creation.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub bit_depth: u32,
    pub buffer_frames: u32,
    pub bpm: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            bit_depth: DEFAULT_BIT_DEPTH,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            bpm: transport::DEFAULT_BPM,
        }
    }
}

/// Point-in-time copy of the scene for UI display.
#[derive(Clone, Copy, Debug)]
pub struct EngineState {
    pub transport: TransportState,
    pub bpm: f64,
    pub sample_rate: u32,
    pub bit_depth: u32,
    pub position_beats: f64,
    pub position_seconds: f64,
    pub bar: u32,
    pub beat: u32,
    pub master_volume: f32,
    pub master_peak_l: f32,
    pub master_peak_r: f32,
    pub track_count: u32,
    pub loop_enabled: bool,
    pub loop_start_beat: f64,
    pub loop_end_beat: f64,
}

/// Snapshot of one track's fields, including live meters.
#[derive(Clone, Debug)]
pub struct TrackInfo {
    pub id: u32,
    pub kind: TrackKind,
    pub name: String,
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub soloed: bool,
    pub armed: bool,
    pub peak_l: f32,
    pub peak_r: f32,
    pub clip_count: u32,
}

/// The scene: every piece of state the audio callback reads. Control threads
/// mutate it behind one mutex; `render` runs under the same mutex for the
/// duration of one device period.
pub struct Engine {
    pub sample_rate: u32,
    pub bit_depth: u32,
    pub buffer_frames: u32,
    pub transport: Transport,
    master_volume: f32,
    tracks: Vec<Track>,
    next_track_id: u32,
    any_solo: bool,
    bus: MixBus,
    master_l: PeakFollower,
    master_r: PeakFollower,
    meters: Arc<MasterMeters>,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        let bpm = if config.bpm > 0.0 {
            config.bpm
        } else {
            transport::DEFAULT_BPM
        };
        Self {
            sample_rate: config.sample_rate,
            bit_depth: config.bit_depth,
            buffer_frames: config.buffer_frames,
            transport: Transport::new(bpm),
            master_volume: 1.0,
            tracks: Vec::new(),
            next_track_id: 1,
            any_solo: false,
            bus: MixBus::new(config.buffer_frames as usize),
            master_l: PeakFollower::default(),
            master_r: PeakFollower::default(),
            meters: MasterMeters::new(),
        }
    }

    /// Lock-free meter bridge handle, shared with whoever displays levels.
    pub fn meters(&self) -> Arc<MasterMeters> {
        self.meters.clone()
    }

    // ── Tracks ──────────────────────────────────────────────────────────

    pub fn create_track(&mut self, kind: TrackKind) -> EngineResult<u32> {
        if self.tracks.len() >= MAX_TRACKS {
            return Err(EngineError::OutOfMemory);
        }
        let id = self.next_track_id;
        self.next_track_id += 1;
        let name = format!("{} {}", kind.display_name(), self.tracks.len() + 1);
        log::info!("track {id} created: '{name}'");
        self.tracks.push(Track::new(id, kind, name));
        Ok(id)
    }

    pub fn destroy_track(&mut self, id: u32) -> EngineResult<()> {
        let index = self
            .tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or(EngineError::InvalidTrack(id))?;
        self.tracks.remove(index);
        self.refresh_any_solo();
        Ok(())
    }

    pub fn track(&self, id: u32) -> EngineResult<&Track> {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .ok_or(EngineError::InvalidTrack(id))
    }

    pub fn track_mut(&mut self, id: u32) -> EngineResult<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(EngineError::InvalidTrack(id))
    }

    pub fn track_info(&self, id: u32) -> EngineResult<TrackInfo> {
        let t = self.track(id)?;
        Ok(TrackInfo {
            id: t.id,
            kind: t.kind,
            name: t.name.clone(),
            volume: t.volume,
            pan: t.pan,
            muted: t.muted,
            soloed: t.soloed,
            armed: t.armed,
            peak_l: t.peak_l,
            peak_r: t.peak_r,
            clip_count: t.clip_count(),
        })
    }

    pub fn set_solo(&mut self, id: u32, soloed: bool) -> EngineResult<()> {
        self.track_mut(id)?.soloed = soloed;
        self.refresh_any_solo();
        Ok(())
    }

    fn refresh_any_solo(&mut self) {
        self.any_solo = self.tracks.iter().any(|t| t.soloed);
    }

    /// Attach a finished clip to a track. The clip is built (decoded,
    /// allocated) by the caller before the scene lock is taken.
    pub fn splice_clip(&mut self, track_id: u32, clip: Clip) -> EngineResult<()> {
        self.track_mut(track_id)?.add_clip(clip)
    }

    // ── Master ──────────────────────────────────────────────────────────

    pub fn set_master_volume(&mut self, volume: f32) -> EngineResult<()> {
        if !(MIN_VOLUME..=MAX_VOLUME).contains(&volume) {
            return Err(EngineError::InvalidParam("master volume out of range"));
        }
        self.master_volume = volume;
        Ok(())
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    // ── Snapshot ────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> EngineState {
        EngineState {
            transport: self.transport.state,
            bpm: self.transport.bpm,
            sample_rate: self.sample_rate,
            bit_depth: self.bit_depth,
            position_beats: self.transport.position_beats,
            position_seconds: self.transport.position_seconds,
            bar: self.transport.bar(),
            beat: self.transport.beat_in_bar(),
            master_volume: self.master_volume,
            master_peak_l: self.master_l.value(),
            master_peak_r: self.master_r.value(),
            track_count: self.tracks.len() as u32,
            loop_enabled: self.transport.looping.enabled,
            loop_start_beat: self.transport.looping.start_beat,
            loop_end_beat: self.transport.looping.end_beat,
        }
    }

    // ── Realtime ────────────────────────────────────────────────────────

    /// Mix one device period into `out` (interleaved stereo) and advance the
    /// playhead. Runs on the audio thread under the scene lock; never
    /// allocates once the bus matches the device period, never fails.
    pub fn render(&mut self, out: &mut [f32]) {
        if !self.transport.state.is_rolling() {
            out.fill(0.0);
            return;
        }

        let frames = out.len() / CHANNELS;
        self.bus.begin_block(frames);

        let timing = BlockTiming::new(self.transport.bpm, self.sample_rate);
        let any_solo = self.any_solo;
        let position_beats = self.transport.position_beats;
        let looping = self.transport.looping;

        for t in &mut self.tracks {
            if t.kind != TrackKind::Audio || t.muted {
                continue;
            }
            if any_solo && !t.soloed {
                continue;
            }
            self.bus
                .accumulate_track(t, position_beats, &looping, &timing);
        }

        self.bus.finish_block(
            out,
            self.master_volume,
            &mut self.master_l,
            &mut self.master_r,
        );
        self.meters
            .store(self.master_l.value(), self.master_r.value());

        self.transport.advance(frames as f64 * timing.seconds_per_frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(sample_rate: u32, buffer_frames: u32, bpm: f64) -> Engine {
        Engine::new(&EngineConfig {
            sample_rate,
            bit_depth: 24,
            buffer_frames,
            bpm,
        })
    }

    /// Clip spanning exactly `n` frames at the engine tempo, one sample per
    /// mixer frame.
    fn clip_of(samples: &[f32], bpm: f64, sample_rate: u32) -> Clip {
        let len_beats = samples.len() as f64 * bpm / (f64::from(sample_rate) * 60.0);
        Clip::new(samples.to_vec(), samples.to_vec(), 0.0, len_beats)
    }

    fn impulse(n: usize, bpm: f64, sample_rate: u32) -> Clip {
        let mut samples = vec![0.0; n];
        samples[0] = 1.0;
        clip_of(&samples, bpm, sample_rate)
    }

    const COS_45: f32 = std::f32::consts::FRAC_1_SQRT_2;

    #[test]
    fn s1_idle_states_emit_silence() {
        let mut e = engine(48000, 64, 120.0);
        let mut out = vec![0.5f32; 128];
        e.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(e.transport.position_beats, 0.0);

        e.transport.play();
        e.transport.pause();
        out.fill(0.5);
        e.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(e.transport.position_beats, 0.0);
    }

    #[test]
    fn s2_unit_impulse_passes_at_pan_center() {
        let mut e = engine(48000, 4, 120.0);
        let id = e.create_track(TrackKind::Audio).unwrap();
        e.splice_clip(id, impulse(4, 120.0, 48000)).unwrap();
        e.transport.play();

        let mut out = vec![0.0f32; 8];
        e.render(&mut out);

        assert!((out[0] - COS_45).abs() < 1e-6);
        assert!((out[1] - COS_45).abs() < 1e-6);
        assert!(out[2..].iter().all(|&s| s == 0.0));

        let info = e.track_info(id).unwrap();
        assert!(info.peak_l > 0.0 && info.peak_r > 0.0);
    }

    #[test]
    fn s3_hard_right_pan_silences_left() {
        let mut e = engine(48000, 4, 120.0);
        let id = e.create_track(TrackKind::Audio).unwrap();
        e.splice_clip(id, impulse(4, 120.0, 48000)).unwrap();
        e.track_mut(id).unwrap().set_pan(1.0);
        e.transport.play();

        let mut out = vec![0.0f32; 8];
        e.render(&mut out);

        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn s4_master_gain_clips_hard() {
        let mut e = engine(48000, 4, 120.0);
        let id = e.create_track(TrackKind::Audio).unwrap();
        e.splice_clip(id, clip_of(&[0.8; 4], 120.0, 48000)).unwrap();
        e.set_master_volume(2.0).unwrap();
        e.transport.play();

        let mut out = vec![0.0f32; 8];
        e.render(&mut out);

        // 0.8 * cos(pi/4) * 2 = 1.13.. clamps to 1.0 on both channels.
        assert!(out.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn s5_loop_keeps_position_inside_region() {
        let mut e = engine(48000, 48000, 120.0);
        e.transport.set_loop(true, 0.0, 2.0).unwrap();
        e.transport.play();

        let mut out = vec![0.0f32; 2 * 48000];
        for _ in 0..3 {
            e.render(&mut out);
            let beats = e.transport.position_beats;
            assert!((0.0..2.0).contains(&beats), "position {beats}");
        }
    }

    #[test]
    fn loop_wrap_never_reads_past_loop_end() {
        let sample_rate = 48000;
        // Two beats of audio: first beat silent, second beat full-scale.
        let n = 48000;
        let mut samples = vec![0.0f32; n];
        for s in &mut samples[n / 2..] {
            *s = 1.0;
        }

        let mut e = engine(sample_rate, 12000, 120.0);
        let id = e.create_track(TrackKind::Audio).unwrap();
        e.splice_clip(id, clip_of(&samples, 120.0, sample_rate)).unwrap();
        e.transport.set_loop(true, 0.0, 1.0).unwrap();
        e.transport.play();

        // Six quarter-beat blocks cover the wrap; only the silent first beat
        // may ever be read.
        let mut out = vec![0.0f32; 24000];
        for _ in 0..6 {
            e.render(&mut out);
            assert!(out.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn playhead_advances_by_exact_block_time() {
        let mut e = engine(48000, 480, 120.0);
        e.transport.play();

        let mut out = vec![0.0f32; 960];
        e.render(&mut out);

        assert!((e.transport.position_seconds - 0.01).abs() < 1e-12);
        assert!((e.transport.position_beats - 0.02).abs() < 1e-12);
    }

    #[test]
    fn solo_dominates_non_soloed_tracks() {
        let mut e = engine(48000, 4, 120.0);
        let quiet = e.create_track(TrackKind::Audio).unwrap();
        let loud = e.create_track(TrackKind::Audio).unwrap();
        e.splice_clip(quiet, clip_of(&[0.0; 4], 120.0, 48000)).unwrap();
        e.splice_clip(loud, clip_of(&[0.9; 4], 120.0, 48000)).unwrap();
        e.set_solo(quiet, true).unwrap();
        e.transport.play();

        let mut out = vec![0.0f32; 8];
        e.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn destroying_soloed_track_restores_the_rest() {
        let mut e = engine(48000, 4, 120.0);
        let soloed = e.create_track(TrackKind::Audio).unwrap();
        let other = e.create_track(TrackKind::Audio).unwrap();
        e.splice_clip(other, clip_of(&[0.5; 4], 120.0, 48000)).unwrap();
        e.set_solo(soloed, true).unwrap();
        e.destroy_track(soloed).unwrap();
        e.transport.play();

        let mut out = vec![0.0f32; 8];
        e.render(&mut out);
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn muted_track_contributes_nothing() {
        let mut e = engine(48000, 4, 120.0);
        let id = e.create_track(TrackKind::Audio).unwrap();
        e.splice_clip(id, clip_of(&[0.9; 4], 120.0, 48000)).unwrap();
        e.track_mut(id).unwrap().muted = true;
        e.transport.play();

        let mut out = vec![0.0f32; 8];
        e.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn non_audio_tracks_are_inert() {
        let mut e = engine(48000, 4, 120.0);
        let id = e.create_track(TrackKind::Midi).unwrap();
        e.splice_clip(id, clip_of(&[0.9; 4], 120.0, 48000)).unwrap();
        e.transport.play();

        let mut out = vec![0.0f32; 8];
        e.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn track_ids_are_monotonic_and_never_reused() {
        let mut e = engine(48000, 64, 120.0);
        let a = e.create_track(TrackKind::Audio).unwrap();
        let b = e.create_track(TrackKind::Audio).unwrap();
        e.destroy_track(a).unwrap();
        let c = e.create_track(TrackKind::Audio).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn track_table_caps_at_limit() {
        let mut e = engine(48000, 64, 120.0);
        for _ in 0..MAX_TRACKS {
            e.create_track(TrackKind::Audio).unwrap();
        }
        assert_eq!(
            e.create_track(TrackKind::Audio).unwrap_err().code(),
            -6
        );
    }

    #[test]
    fn default_names_carry_kind_and_index() {
        let mut e = engine(48000, 64, 120.0);
        let a = e.create_track(TrackKind::Audio).unwrap();
        let m = e.create_track(TrackKind::Midi).unwrap();
        assert_eq!(e.track(a).unwrap().name, "Audio 1");
        assert_eq!(e.track(m).unwrap().name, "MIDI 2");
    }

    #[test]
    fn master_volume_is_validated() {
        let mut e = engine(48000, 64, 120.0);
        assert!(e.set_master_volume(0.0).is_ok());
        assert!(e.set_master_volume(2.0).is_ok());
        assert_eq!(e.set_master_volume(2.1).unwrap_err().code(), -7);
        assert_eq!(e.set_master_volume(-0.1).unwrap_err().code(), -7);
        assert_eq!(e.master_volume(), 2.0);
    }

    #[test]
    fn snapshot_reports_musical_position() {
        let mut e = engine(44100, 512, 120.0);
        e.transport.seek(6.0).unwrap();
        let s = e.snapshot();
        assert_eq!(s.bar, 2);
        assert_eq!(s.beat, 3);
        assert_eq!(s.track_count, 0);
        assert_eq!(s.sample_rate, 44100);
        assert_eq!(s.master_volume, 1.0);
    }
}
