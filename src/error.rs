use thiserror::Error;

/// Main error type for the motion-sentinel library
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("Clip sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Frame-source errors
///
/// `OpenFailed` and `EmptyStream` are the two fatal initialization errors:
/// neither is retried, and a run never starts after either one.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open video source: {source_desc}")]
    OpenFailed { source_desc: String },

    #[error("Source opened but yielded no frames: {source_desc}")]
    EmptyStream { source_desc: String },

    #[error("Failed to read frame from source: {reason}")]
    ReadFailed { reason: String },

    #[error("Failed to probe stream parameters: {reason}")]
    ProbeFailed { reason: String },

    #[error("Unsupported source path: {path}")]
    UnsupportedPath { path: String },
}

/// Clip-sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to create clip writer for '{identity}': {reason}")]
    CreateFailed { identity: String, reason: String },

    #[error("Failed to write frame to clip: {reason}")]
    WriteFailed { reason: String },

    #[error("Clip encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("FFmpeg not found. Please install FFmpeg or use the image-sequence sink.")]
    FfmpegMissing,
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using SentinelError
pub type Result<T> = std::result::Result<T, SentinelError>;

impl SentinelError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Source(SourceError::OpenFailed { source_desc }) => {
                format!(
                    "Could not open video source '{}'. Please check the device or file exists.",
                    source_desc
                )
            }
            Self::Source(SourceError::EmptyStream { source_desc }) => {
                format!(
                    "Video source '{}' opened but produced no frames.",
                    source_desc
                )
            }
            Self::Sink(SinkError::FfmpegMissing) => {
                "FFmpeg is required for MP4 clips. Install it or pass --sink image-dir."
                    .to_string()
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
