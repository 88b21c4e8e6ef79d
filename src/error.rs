// Error types shared by the renderer, the decoder and the playback loop
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The source file could not be opened or decoded. Raised before playback starts.
    #[error("Failed to load source {path:?}: {reason}")]
    SourceLoad { path: PathBuf, reason: String },

    /// No usable output device, or format negotiation / stream setup failed.
    #[error("Failed to initialize output device: {0}")]
    DeviceInit(String),

    /// The device failed while streaming (acquire, release, start or stop).
    #[error("Output device failure: {0}")]
    DeviceIo(String),

    /// A spatial model was handed a NaN or infinite angle.
    #[error("Angle must be finite, got {0}")]
    Domain(f32),

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("Operation not permitted in player state {0:?}")]
    InvalidState(crate::audio::player::PlayerState),
}

impl Error {
    pub(crate) fn source_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::SourceLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
