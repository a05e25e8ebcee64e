// src/runtime.rs
//
// Control surface. A `DawRuntime` owns the scene (behind the mutex the audio
// callback shares) plus the playback backend driving it. The process-wide
// singleton at the bottom backs the C embedding surface.

use std::sync::{Arc, Mutex};

use crate::audio::PlaybackBackend;
use crate::decoder;
use crate::engine::track::bounded_name;
use crate::engine::{
    Clip, Engine, EngineConfig, EngineState, MasterMeters, TrackInfo, TrackKind,
};
use crate::error::{EngineError, EngineResult};

pub struct DawRuntime {
    engine: Arc<Mutex<Engine>>,
    meters: Arc<MasterMeters>,
    backend: Box<dyn PlaybackBackend>,
    sample_rate: u32,
}

impl DawRuntime {
    /// Build the scene and start the backend. On backend failure nothing
    /// leaks: the engine is dropped and the error surfaces to the caller.
    pub fn start(
        config: EngineConfig,
        mut backend: Box<dyn PlaybackBackend>,
    ) -> EngineResult<Self> {
        let engine = Arc::new(Mutex::new(Engine::new(&config)));
        let meters = engine.lock().unwrap().meters();

        let engine_cb = engine.clone();
        backend.open(
            config.sample_rate,
            config.buffer_frames,
            Box::new(move |data: &mut [f32]| {
                if let Ok(mut eng) = engine_cb.lock() {
                    eng.render(data);
                } else {
                    data.fill(0.0);
                }
            }),
        )?;

        Ok(Self {
            engine,
            meters,
            backend,
            sample_rate: config.sample_rate,
        })
    }

    // ── Transport ───────────────────────────────────────────────────────

    pub fn play(&self) {
        if let Ok(mut eng) = self.engine.lock() {
            eng.transport.play();
        }
    }

    pub fn stop(&self) {
        if let Ok(mut eng) = self.engine.lock() {
            eng.transport.stop();
        }
    }

    pub fn pause(&self) {
        if let Ok(mut eng) = self.engine.lock() {
            eng.transport.pause();
        }
    }

    pub fn record(&self) {
        if let Ok(mut eng) = self.engine.lock() {
            eng.transport.record();
        }
    }

    pub fn seek(&self, beat: f64) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.transport.seek(beat)
        } else {
            Ok(())
        }
    }

    pub fn set_bpm(&self, bpm: f64) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.transport.set_bpm(bpm)
        } else {
            Ok(())
        }
    }

    pub fn set_loop(&self, enabled: bool, start_beat: f64, end_beat: f64) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.transport.set_loop(enabled, start_beat, end_beat)
        } else {
            Ok(())
        }
    }

    // ── Master ──────────────────────────────────────────────────────────

    pub fn set_master_volume(&self, volume: f32) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.set_master_volume(volume)
        } else {
            Ok(())
        }
    }

    /// Reads the lock-free meter bridge; never contends with the callback.
    pub fn master_peaks(&self) -> (f32, f32) {
        self.meters.load()
    }

    pub fn state(&self) -> EngineState {
        self.engine.lock().unwrap().snapshot()
    }

    // ── Tracks ──────────────────────────────────────────────────────────

    pub fn create_track(&self, kind: TrackKind) -> EngineResult<u32> {
        self.engine.lock().unwrap().create_track(kind)
    }

    pub fn destroy_track(&self, id: u32) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.destroy_track(id)
        } else {
            Ok(())
        }
    }

    pub fn track_info(&self, id: u32) -> EngineResult<TrackInfo> {
        self.engine.lock().unwrap().track_info(id)
    }

    pub fn set_track_name(&self, id: u32, name: &str) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.track_mut(id)?.name = bounded_name(name).to_string();
        }
        Ok(())
    }

    pub fn set_track_volume(&self, id: u32, volume: f32) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.track_mut(id)?.set_volume(volume);
        }
        Ok(())
    }

    pub fn set_track_pan(&self, id: u32, pan: f32) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.track_mut(id)?.set_pan(pan);
        }
        Ok(())
    }

    pub fn set_track_mute(&self, id: u32, muted: bool) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.track_mut(id)?.muted = muted;
        }
        Ok(())
    }

    pub fn set_track_solo(&self, id: u32, soloed: bool) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.set_solo(id, soloed)
        } else {
            Ok(())
        }
    }

    pub fn set_track_armed(&self, id: u32, armed: bool) -> EngineResult<()> {
        if let Ok(mut eng) = self.engine.lock() {
            eng.track_mut(id)?.armed = armed;
        }
        Ok(())
    }

    /// Decode `path` and append it to `id` as a clip at beat 0. The decode
    /// and buffer allocation run without the scene lock; the finished clip
    /// is spliced in atomically, so the callback only ever sees the track
    /// before or after the whole load.
    pub fn load_file(&self, id: u32, path: &str) -> EngineResult<()> {
        {
            let eng = self.engine.lock().unwrap();
            let track = eng.track(id)?;
            if !track.has_clip_capacity() {
                return Err(EngineError::ClipFull);
            }
        }

        let pcm = decoder::decode_file(path, self.sample_rate)?;
        let frames = pcm.left.len();

        let mut eng = self.engine.lock().unwrap();
        // Clip duration in beats comes from the tempo at splice time; later
        // BPM changes re-place the audio rather than stretch it.
        let len_beats =
            frames as f64 * eng.transport.bpm / (f64::from(self.sample_rate) * 60.0);
        eng.splice_clip(id, Clip::new(pcm.left, pcm.right, 0.0, len_beats))?;
        log::info!("track {id}: '{path}' loaded ({frames} frames)");
        Ok(())
    }
}

impl Drop for DawRuntime {
    fn drop(&mut self) {
        // Halt the backend first: once stop returns the callback can no
        // longer run, and the clip PCM may be released.
        self.backend.stop();
    }
}

// ── Process-wide singleton (C embedding surface) ───────────────────────────

static GLOBAL: Mutex<Option<DawRuntime>> = Mutex::new(None);

/// Stand up the process-wide engine. Fails with `AlreadyInit` until a
/// matching [`shutdown_global`].
pub fn init_global(config: EngineConfig, backend: Box<dyn PlaybackBackend>) -> EngineResult<()> {
    let mut slot = GLOBAL.lock().unwrap();
    if slot.is_some() {
        return Err(EngineError::AlreadyInit);
    }
    let runtime = DawRuntime::start(config, backend)?;
    log::info!(
        "{} initialized: sr={} buffer={} bpm={}",
        crate::VERSION,
        config.sample_rate,
        config.buffer_frames,
        config.bpm
    );
    *slot = Some(runtime);
    Ok(())
}

pub fn shutdown_global() -> EngineResult<()> {
    let mut slot = GLOBAL.lock().unwrap();
    match slot.take() {
        Some(runtime) => {
            drop(runtime);
            log::info!("engine shut down");
            Ok(())
        }
        None => Err(EngineError::NotInit),
    }
}

/// Run `f` against the live runtime, or report `NotInit`.
pub fn with_global<T>(f: impl FnOnce(&DawRuntime) -> EngineResult<T>) -> EngineResult<T> {
    let slot = GLOBAL.lock().unwrap();
    match slot.as_ref() {
        Some(runtime) => f(runtime),
        None => Err(EngineError::NotInit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MixCallback;
    use crate::engine::TransportState;

    /// Backend stub: optionally refuses to open, otherwise parks the
    /// callback where the test can drive it by hand.
    #[derive(Default)]
    struct StubBackend {
        refuse: bool,
        callback: Arc<Mutex<Option<MixCallback>>>,
    }

    impl StubBackend {
        fn refusing() -> Self {
            Self {
                refuse: true,
                ..Self::default()
            }
        }
    }

    impl PlaybackBackend for StubBackend {
        fn open(
            &mut self,
            _sample_rate: u32,
            _period_frames: u32,
            callback: MixCallback,
        ) -> EngineResult<()> {
            if self.refuse {
                return Err(EngineError::AudioDevice("stub refused".into()));
            }
            *self.callback.lock().unwrap() = Some(callback);
            Ok(())
        }

        fn stop(&mut self) {
            self.callback.lock().unwrap().take();
        }
    }

    #[test]
    fn runtime_drives_transport_and_tracks() {
        let stub = StubBackend::default();
        let callback = stub.callback.clone();
        let rt = DawRuntime::start(EngineConfig::default(), Box::new(stub)).unwrap();

        let id = rt.create_track(TrackKind::Audio).unwrap();
        rt.set_track_volume(id, 5.0).unwrap();
        rt.set_track_pan(id, -3.0).unwrap();
        let info = rt.track_info(id).unwrap();
        assert_eq!(info.volume, 2.0);
        assert_eq!(info.pan, -1.0);

        rt.set_track_name(id, &"n".repeat(100)).unwrap();
        assert_eq!(rt.track_info(id).unwrap().name.len(), 63);

        rt.play();
        assert_eq!(rt.state().transport, TransportState::Playing);
        rt.pause();
        assert_eq!(rt.state().transport, TransportState::Paused);
        rt.stop();
        assert_eq!(rt.state().transport, TransportState::Stopped);

        // Stopped transport renders silence through the whole stack.
        let mut out = vec![0.7f32; 128];
        (callback.lock().unwrap().as_mut().unwrap())(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        assert_eq!(rt.master_peaks(), (0.0, 0.0));
        assert_eq!(rt.destroy_track(999).unwrap_err().code(), -4);
    }

    #[test]
    fn load_failure_leaves_track_unchanged() {
        let rt =
            DawRuntime::start(EngineConfig::default(), Box::new(StubBackend::default())).unwrap();
        let id = rt.create_track(TrackKind::Audio).unwrap();

        let err = rt.load_file(id, "missing/take.wav").unwrap_err();
        assert_eq!(err.code(), -5);
        assert_eq!(rt.track_info(id).unwrap().clip_count, 0);

        assert_eq!(rt.load_file(404, "missing/take.wav").unwrap_err().code(), -4);
    }

    // The remaining tests share the process-global slot; everything runs in
    // one test so no ordering between tests can interfere.
    #[test]
    fn global_lifecycle_matches_the_embedding_contract() {
        // Backend failure leaves no partial state behind.
        let err = init_global(EngineConfig::default(), Box::new(StubBackend::refusing()));
        assert_eq!(err.unwrap_err().code(), -3);
        assert_eq!(shutdown_global().unwrap_err().code(), -1);

        // Normal bring-up; a second init is rejected.
        init_global(EngineConfig::default(), Box::new(StubBackend::default())).unwrap();
        let again = init_global(EngineConfig::default(), Box::new(StubBackend::default()));
        assert_eq!(again.unwrap_err().code(), -2);

        with_global(|rt| {
            rt.play();
            Ok(())
        })
        .unwrap();

        shutdown_global().unwrap();
        assert_eq!(shutdown_global().unwrap_err().code(), -1);
        assert_eq!(
            with_global(|rt| Ok(rt.state())).unwrap_err().code(),
            -1
        );
    }
}
