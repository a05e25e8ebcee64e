// src/engine/metering.rs

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Per-sample decay applied while the signal sits below the held peak.
/// Fast attack, slow release.
const PEAK_DECAY: f32 = 0.9997;

/// Peak follower owned by the audio thread. Feed it every sample that
/// reaches the meter point; read `value` whenever a snapshot is taken.
#[derive(Clone, Copy, Debug, Default)]
pub struct PeakFollower {
    value: f32,
}

impl PeakFollower {
    pub fn feed(&mut self, sample: f32) {
        let a = sample.abs();
        if a > self.value {
            self.value = a;
        } else {
            self.value *= PEAK_DECAY;
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Lock-free master meter bridge. The audio thread stores after each block,
/// UI/control threads load without touching the scene lock. A torn L/R pair
/// is harmless for a meter.
pub struct MasterMeters {
    peak_l: AtomicU32,
    peak_r: AtomicU32,
}

impl MasterMeters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peak_l: AtomicU32::new(0.0f32.to_bits()),
            peak_r: AtomicU32::new(0.0f32.to_bits()),
        })
    }

    pub fn store(&self, left: f32, right: f32) {
        self.peak_l.store(left.to_bits(), Ordering::Relaxed);
        self.peak_r.store(right.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> (f32, f32) {
        (
            f32::from_bits(self.peak_l.load(Ordering::Relaxed)),
            f32::from_bits(self.peak_r.load(Ordering::Relaxed)),
        )
    }
}
