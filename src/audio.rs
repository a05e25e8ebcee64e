// src/audio.rs
//
// Playback-device adapter. The engine's only demand on a backend: call the
// mix callback with an interleaved stereo f32 buffer, one device period at
// a time, until stopped.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};

use crate::engine::CHANNELS;
use crate::error::{EngineError, EngineResult};

/// Render callback invoked on the device thread with `period * 2` samples.
pub type MixCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Seam between the engine and whatever drives it. Production uses
/// [`CpalBackend`]; tests substitute a stub so no device is required.
pub trait PlaybackBackend: Send {
    /// Open and start a stereo f32 output stream at `sample_rate` with the
    /// requested period, driving `callback`.
    fn open(
        &mut self,
        sample_rate: u32,
        period_frames: u32,
        callback: MixCallback,
    ) -> EngineResult<()>;

    /// Stop the stream and block until the callback can no longer run.
    fn stop(&mut self);
}

/// cpal-backed playback. cpal streams are not `Send`, so the stream is owned
/// by a dedicated thread; open and stop are synchronous channel handshakes
/// with it.
#[derive(Default)]
pub struct CpalBackend {
    worker: Option<Worker>,
}

struct Worker {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

impl PlaybackBackend for CpalBackend {
    fn open(
        &mut self,
        sample_rate: u32,
        period_frames: u32,
        callback: MixCallback,
    ) -> EngineResult<()> {
        if self.worker.is_some() {
            return Err(EngineError::AudioDevice("backend already open".into()));
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("barline-audio".into())
            .spawn(move || run_stream(sample_rate, period_frames, callback, ready_tx, stop_rx))
            .map_err(|e| EngineError::AudioDevice(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(Worker { stop_tx, thread });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(EngineError::AudioDevice(
                    "audio thread exited before opening".into(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.thread.join();
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_stream(
    sample_rate: u32,
    period_frames: u32,
    callback: MixCallback,
    ready_tx: Sender<EngineResult<()>>,
    stop_rx: Receiver<()>,
) {
    let stream = match open_stream(sample_rate, period_frames, callback) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if ready_tx.send(Ok(())).is_err() {
        return;
    }

    // Park until shutdown; dropping the stream stops the callback.
    let _ = stop_rx.recv();
    drop(stream);
}

fn open_stream(
    sample_rate: u32,
    period_frames: u32,
    mut callback: MixCallback,
) -> EngineResult<cpal::Stream> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| EngineError::AudioDevice("no output device available".into()))?;

    let config = StreamConfig {
        channels: CHANNELS as u16,
        sample_rate: SampleRate(sample_rate),
        buffer_size: BufferSize::Fixed(period_frames),
    };
    let err_fn = |err| log::error!("playback stream error: {err}");

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback(data),
            err_fn,
            None,
        )
        .map_err(|e| EngineError::AudioDevice(e.to_string()))?;

    stream
        .play()
        .map_err(|e| EngineError::AudioDevice(e.to_string()))?;
    Ok(stream)
}
