// src/engine/mixer.rs

use std::f32::consts::FRAC_PI_4;

use super::metering::PeakFollower;
use super::track::Track;
use super::transport::LoopRegion;

/// Constant-power pan law: gain pair `(cos a, sin a)` with
/// `a = (pan + 1) * PI/4`. Center pan puts sqrt(2)/2 on both sides.
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let a = (pan + 1.0) * FRAC_PI_4;
    (a.cos(), a.sin())
}

/// Timing constants for one rendered block. Timeline math stays in f64 so a
/// playhead that runs for hours does not drift.
#[derive(Clone, Copy, Debug)]
pub struct BlockTiming {
    pub seconds_per_frame: f64,
    pub beats_per_frame: f64,
}

impl BlockTiming {
    pub fn new(bpm: f64, sample_rate: u32) -> Self {
        let seconds_per_beat = 60.0 / bpm;
        let seconds_per_frame = 1.0 / f64::from(sample_rate);
        Self {
            seconds_per_frame,
            beats_per_frame: seconds_per_frame / seconds_per_beat,
        }
    }
}

/// Per-callback summing bus: one pair of channel accumulators that every
/// audible track adds into before the master stage interleaves them out.
pub struct MixBus {
    mix_l: Vec<f32>,
    mix_r: Vec<f32>,
}

impl MixBus {
    pub fn new(frames: usize) -> Self {
        Self {
            mix_l: vec![0.0; frames],
            mix_r: vec![0.0; frames],
        }
    }

    /// Zero the accumulators for a block of `frames`. Only reallocates when
    /// the device changes its period size.
    pub fn begin_block(&mut self, frames: usize) {
        if self.mix_l.len() != frames {
            self.mix_l.resize(frames, 0.0);
            self.mix_r.resize(frames, 0.0);
        }
        self.mix_l.fill(0.0);
        self.mix_r.fill(0.0);
    }

    /// Resolve every active clip on `track` against the playhead and sum the
    /// hit samples into the bus. Also refreshes the track's peak meters from
    /// this block's contributions.
    pub fn accumulate_track(
        &mut self,
        track: &mut Track,
        position_beats: f64,
        looping: &LoopRegion,
        timing: &BlockTiming,
    ) {
        let (mut gl, mut gr) = pan_gains(track.pan);
        gl *= track.volume;
        gr *= track.volume;

        let mut peak_l = PeakFollower::default();
        let mut peak_r = PeakFollower::default();
        let frames = self.mix_l.len();
        let loop_span = looping.end_beat - looping.start_beat;

        for clip in track.clips() {
            if !clip.active {
                continue;
            }
            let left = clip.left();
            let right = clip.right();
            let n_frames = clip.n_frames();

            for f in 0..frames {
                let mut beat_at = position_beats + f as f64 * timing.beats_per_frame;

                if looping.enabled && beat_at >= looping.end_beat {
                    beat_at = looping.start_beat + (beat_at - looping.start_beat) % loop_span;
                }

                if beat_at < clip.start_beat || beat_at >= clip.end_beat() {
                    continue;
                }

                let offset = (beat_at - clip.start_beat) / clip.len_beats;
                let frame_index = (offset * n_frames as f64) as usize;
                if frame_index >= n_frames {
                    continue;
                }

                let sl = left[frame_index] * gl;
                let sr = right[frame_index] * gr;
                self.mix_l[f] += sl;
                self.mix_r[f] += sr;
                peak_l.feed(sl);
                peak_r.feed(sr);
            }
        }

        track.peak_l = peak_l.value();
        track.peak_r = peak_r.value();
    }

    /// Apply master gain, hard-clip to [-1, 1], interleave into `out` and
    /// feed the master peak followers.
    pub fn finish_block(
        &self,
        out: &mut [f32],
        master_volume: f32,
        master_l: &mut PeakFollower,
        master_r: &mut PeakFollower,
    ) {
        for (f, frame) in out.chunks_exact_mut(2).enumerate() {
            let l = (self.mix_l[f] * master_volume).clamp(-1.0, 1.0);
            let r = (self.mix_r[f] * master_volume).clamp(-1.0, 1.0);
            frame[0] = l;
            frame[1] = r;
            master_l.feed(l);
            master_r.feed(r);
        }
    }
}
