// src/ffi.rs
//
// C-compatible control surface for foreign front-ends. Every function
// returns a result code from error.rs; structs are plain-old-data with
// fixed layouts so callers can mirror them through ctypes/P-Invoke/etc.
//
// Safety requirements:
// - Pointers must be valid for the duration of the call (null is tolerated
//   and reported as a parameter error where the contract allows).
// - Strings are null-terminated UTF-8.

use std::ffi::{c_char, CStr};

use crate::audio::CpalBackend;
use crate::engine::track::bounded_name;
use crate::engine::{EngineConfig, EngineState, TrackInfo, TrackKind};
use crate::error::{EngineError, EngineResult, OK};
use crate::runtime;

/// Engine configuration handed to [`bl_init`]. Zero fields fall back to the
/// built-in defaults where the engine defines one.
#[repr(C)]
pub struct BlConfig {
    pub sample_rate: u32,
    pub bit_depth: u32,
    pub buffer_frames: u32,
    pub bpm: f64,
}

/// Transport/master snapshot returned by [`bl_get_state`].
#[repr(C)]
pub struct BlState {
    pub transport: u32,
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

impl From<EngineState> for BlState {
    fn from(s: EngineState) -> Self {
        Self {
            transport: s.transport as u32,
            bpm: s.bpm,
            sample_rate: s.sample_rate,
            bit_depth: s.bit_depth,
            position_beats: s.position_beats,
            position_seconds: s.position_seconds,
            bar: s.bar,
            beat: s.beat,
            master_volume: s.master_volume,
            master_peak_l: s.master_peak_l,
            master_peak_r: s.master_peak_r,
            track_count: s.track_count,
            loop_enabled: s.loop_enabled,
            loop_start_beat: s.loop_start_beat,
            loop_end_beat: s.loop_end_beat,
        }
    }
}

/// Track snapshot returned by [`bl_track_info`].
#[repr(C)]
pub struct BlTrackInfo {
    pub id: u32,
    pub kind: u32,
    pub name: [c_char; 64],
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub soloed: bool,
    pub armed: bool,
    pub peak_l: f32,
    pub peak_r: f32,
    pub clip_count: u32,
}

impl From<TrackInfo> for BlTrackInfo {
    fn from(t: TrackInfo) -> Self {
        let mut name = [0 as c_char; 64];
        copy_name(&mut name, &t.name);
        Self {
            id: t.id,
            kind: t.kind as u32,
            name,
            volume: t.volume,
            pan: t.pan,
            muted: t.muted,
            soloed: t.soloed,
            armed: t.armed,
            peak_l: t.peak_l,
            peak_r: t.peak_r,
            clip_count: t.clip_count,
        }
    }
}

fn copy_name(dst: &mut [c_char; 64], name: &str) {
    let name = bounded_name(name);
    for (slot, &byte) in dst.iter_mut().zip(name.as_bytes()) {
        *slot = byte as c_char;
    }
    dst[name.len()] = 0;
}

fn code(result: EngineResult<()>) -> i32 {
    match result {
        Ok(()) => OK,
        Err(e) => e.code(),
    }
}

// ── Lifecycle ──────────────────────────────────────────────────────────────

/// Initialize the process-wide engine and start the playback device.
///
/// # Safety
/// `config` must be null or point to a valid `BlConfig`.
#[no_mangle]
pub unsafe extern "C" fn bl_init(config: *const BlConfig) -> i32 {
    let cfg = if config.is_null() {
        EngineConfig::default()
    } else {
        let c = &*config;
        let defaults = EngineConfig::default();
        EngineConfig {
            sample_rate: if c.sample_rate > 0 {
                c.sample_rate
            } else {
                defaults.sample_rate
            },
            bit_depth: if c.bit_depth > 0 {
                c.bit_depth
            } else {
                defaults.bit_depth
            },
            buffer_frames: if c.buffer_frames > 0 {
                c.buffer_frames
            } else {
                defaults.buffer_frames
            },
            bpm: c.bpm,
        }
    };
    code(runtime::init_global(cfg, Box::<CpalBackend>::default()))
}

/// Stop the playback device and release every track and clip.
#[no_mangle]
pub extern "C" fn bl_shutdown() -> i32 {
    code(runtime::shutdown_global())
}

/// # Safety
/// `out` must be null or point to writable `BlState` storage.
#[no_mangle]
pub unsafe extern "C" fn bl_get_state(out: *mut BlState) -> i32 {
    let state = match runtime::with_global(|rt| Ok(rt.state())) {
        Ok(s) => s,
        Err(e) => return e.code(),
    };
    if out.is_null() {
        return EngineError::InvalidParam("state out pointer is null").code();
    }
    *out = BlState::from(state);
    OK
}

#[no_mangle]
pub extern "C" fn bl_version() -> *const c_char {
    concat!("Barline Engine ", env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

#[no_mangle]
pub extern "C" fn bl_strerror(result: i32) -> *const c_char {
    let message: &'static str = match result {
        0 => "OK\0",
        -1 => "engine not initialized\0",
        -2 => "engine already initialized\0",
        -3 => "audio device failure\0",
        -4 => "invalid track\0",
        -5 => "file not found\0",
        -6 => "out of memory\0",
        -7 => "invalid parameter\0",
        -8 => "track clip table is full\0",
        _ => "unknown error\0",
    };
    message.as_ptr() as *const c_char
}

// ── Transport ──────────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn bl_play() -> i32 {
    code(runtime::with_global(|rt| {
        rt.play();
        Ok(())
    }))
}

#[no_mangle]
pub extern "C" fn bl_stop() -> i32 {
    code(runtime::with_global(|rt| {
        rt.stop();
        Ok(())
    }))
}

#[no_mangle]
pub extern "C" fn bl_pause() -> i32 {
    code(runtime::with_global(|rt| {
        rt.pause();
        Ok(())
    }))
}

#[no_mangle]
pub extern "C" fn bl_record() -> i32 {
    code(runtime::with_global(|rt| {
        rt.record();
        Ok(())
    }))
}

#[no_mangle]
pub extern "C" fn bl_seek(beat: f64) -> i32 {
    code(runtime::with_global(|rt| rt.seek(beat)))
}

#[no_mangle]
pub extern "C" fn bl_set_bpm(bpm: f64) -> i32 {
    code(runtime::with_global(|rt| rt.set_bpm(bpm)))
}

#[no_mangle]
pub extern "C" fn bl_set_loop(enabled: bool, start_beat: f64, end_beat: f64) -> i32 {
    code(runtime::with_global(|rt| {
        rt.set_loop(enabled, start_beat, end_beat)
    }))
}

// ── Master ─────────────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn bl_set_master_volume(volume: f32) -> i32 {
    code(runtime::with_global(|rt| rt.set_master_volume(volume)))
}

/// Meter read; does not contend with the audio callback.
///
/// # Safety
/// `out_l` and `out_r` must be null or point to writable f32 storage.
#[no_mangle]
pub unsafe extern "C" fn bl_get_master_peaks(out_l: *mut f32, out_r: *mut f32) -> i32 {
    let peaks = match runtime::with_global(|rt| Ok(rt.master_peaks())) {
        Ok(p) => p,
        Err(e) => return e.code(),
    };
    if out_l.is_null() || out_r.is_null() {
        return EngineError::InvalidParam("peak out pointer is null").code();
    }
    *out_l = peaks.0;
    *out_r = peaks.1;
    OK
}

// ── Tracks ─────────────────────────────────────────────────────────────────

/// # Safety
/// `out_id` must be null or point to writable u32 storage.
#[no_mangle]
pub unsafe extern "C" fn bl_track_create(kind: u32, out_id: *mut u32) -> i32 {
    if out_id.is_null() {
        return EngineError::OutOfMemory.code();
    }
    match runtime::with_global(|rt| rt.create_track(TrackKind::from_raw(kind))) {
        Ok(id) => {
            *out_id = id;
            OK
        }
        Err(e) => e.code(),
    }
}

#[no_mangle]
pub extern "C" fn bl_track_destroy(id: u32) -> i32 {
    code(runtime::with_global(|rt| rt.destroy_track(id)))
}

/// # Safety
/// `out` must be null or point to writable `BlTrackInfo` storage.
#[no_mangle]
pub unsafe extern "C" fn bl_track_info(id: u32, out: *mut BlTrackInfo) -> i32 {
    let info = match runtime::with_global(|rt| rt.track_info(id)) {
        Ok(i) => i,
        Err(e) => return e.code(),
    };
    if out.is_null() {
        return EngineError::InvalidParam("track info out pointer is null").code();
    }
    *out = BlTrackInfo::from(info);
    OK
}

/// # Safety
/// `name` must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn bl_track_set_name(id: u32, name: *const c_char) -> i32 {
    if name.is_null() {
        return EngineError::InvalidParam("name is null").code();
    }
    let name = match CStr::from_ptr(name).to_str() {
        Ok(s) => s,
        Err(_) => return EngineError::InvalidParam("name is not UTF-8").code(),
    };
    code(runtime::with_global(|rt| rt.set_track_name(id, name)))
}

#[no_mangle]
pub extern "C" fn bl_track_set_vol(id: u32, volume: f32) -> i32 {
    code(runtime::with_global(|rt| rt.set_track_volume(id, volume)))
}

#[no_mangle]
pub extern "C" fn bl_track_set_pan(id: u32, pan: f32) -> i32 {
    code(runtime::with_global(|rt| rt.set_track_pan(id, pan)))
}

#[no_mangle]
pub extern "C" fn bl_track_set_mute(id: u32, muted: bool) -> i32 {
    code(runtime::with_global(|rt| rt.set_track_mute(id, muted)))
}

#[no_mangle]
pub extern "C" fn bl_track_set_solo(id: u32, soloed: bool) -> i32 {
    code(runtime::with_global(|rt| rt.set_track_solo(id, soloed)))
}

#[no_mangle]
pub extern "C" fn bl_track_set_armed(id: u32, armed: bool) -> i32 {
    code(runtime::with_global(|rt| rt.set_track_armed(id, armed)))
}

/// # Safety
/// `path` must be null or a valid null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn bl_track_load_file(id: u32, path: *const c_char) -> i32 {
    if path.is_null() {
        return EngineError::InvalidParam("path is null").code();
    }
    let path = match CStr::from_ptr(path).to_str() {
        Ok(s) => s,
        Err(_) => return EngineError::InvalidParam("path is not UTF-8").code(),
    };
    code(runtime::with_global(|rt| rt.load_file(id, path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error;
    use std::ffi::CStr;

    #[test]
    fn version_is_null_terminated_and_stamped() {
        let v = unsafe { CStr::from_ptr(bl_version()) };
        assert!(v.to_str().unwrap().starts_with("Barline Engine "));
    }

    #[test]
    fn strerror_matches_the_rust_side_table() {
        for result in [-9, -8, -7, -6, -5, -4, -3, -2, -1, 0, 1] {
            let c_msg = unsafe { CStr::from_ptr(bl_strerror(result)) };
            assert_eq!(c_msg.to_str().unwrap(), error::strerror(result));
        }
    }

    #[test]
    fn name_copy_truncates_and_terminates() {
        let mut dst = [0 as c_char; 64];
        copy_name(&mut dst, "Drums");
        assert_eq!(dst[0] as u8, b'D');
        assert_eq!(dst[5], 0);

        let long = "z".repeat(80);
        copy_name(&mut dst, &long);
        assert_eq!(dst[62] as u8, b'z');
        assert_eq!(dst[63], 0);
    }

    #[test]
    fn name_copy_never_splits_a_codepoint() {
        // 62 ASCII bytes + one 2-byte char: 64 bytes total, so truncation
        // backs off to the character boundary at 62.
        let mut dst = [0 as c_char; 64];
        let mixed = format!("{}é", "w".repeat(62));
        copy_name(&mut dst, &mixed);
        assert_eq!(dst[61] as u8, b'w');
        assert_eq!(dst[62], 0);
    }
}
