// src/decoder.rs
//
// Whole-file decode adapter. The engine treats the decoder as an external
// collaborator: give it a path, get back deinterleaved stereo f32 PCM.
// No resampling happens here; a clip decoded at a foreign rate plays back
// at the engine rate.

use std::fs::File;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::default::{get_codecs, get_probe};

use crate::error::{EngineError, EngineResult};

/// Decode budget for streams that cannot report their length: 30 seconds at
/// the engine rate. Decoding stops there, so an endless stream yields an
/// "up to 30 s" clip.
pub fn fallback_frames(sample_rate: u32) -> u64 {
    u64::from(sample_rate) * 30
}

#[derive(Debug)]
pub struct DecodedPcm {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub source_rate: u32,
}

/// Decode `path` completely into deinterleaved stereo buffers. Mono sources
/// are duplicated to both channels; sources with more than two channels
/// contribute their first two. Anything that cannot be opened, probed, or
/// yields zero frames reports `FileNotFound`.
pub fn decode_file(path: &str, engine_rate: u32) -> EngineResult<DecodedPcm> {
    let not_found = || EngineError::FileNotFound(path.to_string());

    let file = File::open(path).map_err(|_| not_found())?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = get_probe()
        .format(
            &Default::default(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|_| not_found())?;
    let mut format = probed.format;

    let track = format.default_track().ok_or_else(not_found)?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let source_rate = codec_params.sample_rate.unwrap_or(engine_rate);
    if source_rate != engine_rate {
        log::warn!(
            "{path}: source rate {source_rate} != engine rate {engine_rate}, \
             clip will play unresampled"
        );
    }

    let frame_cap = match codec_params.n_frames {
        Some(n) if n > 0 => n,
        _ => fallback_frames(engine_rate),
    };

    let mut decoder = get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|_| not_found())?;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut left = Vec::new();
    let mut right = Vec::new();

    'packets: loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
            Err(_) => break,
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            continue;
        }

        if sample_buf
            .as_ref()
            .map_or(true, |b| b.capacity() < decoded.capacity())
        {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let buf = sample_buf.as_mut().unwrap();
        buf.copy_interleaved_ref(decoded);

        for frame in buf.samples().chunks_exact(channels) {
            if left.len() as u64 >= frame_cap {
                break 'packets;
            }
            if channels == 1 {
                left.push(frame[0]);
                right.push(frame[0]);
            } else {
                left.push(frame[0]);
                right.push(frame[1]);
            }
        }
    }

    if left.is_empty() {
        return Err(not_found());
    }

    log::debug!("{path}: decoded {} frames at {source_rate} Hz", left.len());
    Ok(DecodedPcm {
        left,
        right,
        source_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_maps_to_file_not_found() {
        let err = decode_file("definitely/not/here.wav", 44100).unwrap_err();
        assert_eq!(err.code(), -5);
    }

    #[test]
    fn fallback_budget_is_thirty_seconds() {
        assert_eq!(fallback_frames(44100), 44100 * 30);
        assert_eq!(fallback_frames(48000), 48000 * 30);
    }
}
