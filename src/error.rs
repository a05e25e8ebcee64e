// src/error.rs

use thiserror::Error;

/// Success code shared with the C control surface.
pub const OK: i32 = 0;

/// Every failure a control operation can report. The discriminant codes are
/// part of the embedding contract and must never be renumbered.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine not initialized")]
    NotInit,

    #[error("engine already initialized")]
    AlreadyInit,

    #[error("audio device failure: {0}")]
    AudioDevice(String),

    #[error("no track with id {0}")]
    InvalidTrack(u32),

    #[error("file not found or not decodable: {0}")]
    FileNotFound(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    #[error("track clip table is full")]
    ClipFull,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Stable integer code for foreign callers.
    pub fn code(&self) -> i32 {
        match self {
            EngineError::NotInit => -1,
            EngineError::AlreadyInit => -2,
            EngineError::AudioDevice(_) => -3,
            EngineError::InvalidTrack(_) => -4,
            EngineError::FileNotFound(_) => -5,
            EngineError::OutOfMemory => -6,
            EngineError::InvalidParam(_) => -7,
            EngineError::ClipFull => -8,
        }
    }
}

/// Static message for a result code, for callers that only kept the integer.
pub fn strerror(code: i32) -> &'static str {
    match code {
        0 => "OK",
        -1 => "engine not initialized",
        -2 => "engine already initialized",
        -3 => "audio device failure",
        -4 => "invalid track",
        -5 => "file not found",
        -6 => "out of memory",
        -7 => "invalid parameter",
        -8 => "track clip table is full",
        _ => "unknown error",
    }
}
