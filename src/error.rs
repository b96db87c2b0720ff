//! Error types for the exporter and relay

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while exporting a snapshot or relaying an image
#[derive(Error, Debug)]
pub enum Error {
    /// The requested subtree is not attached to the document
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// Caller supplied an unusable argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network error (direct fetch or relay)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Image bytes could not be decoded
    #[error("Decode failed: {0}")]
    DecodeError(String),

    /// Failed to rasterize content
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// The download could not be delivered
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::NetworkError(format!("request timed out: {}", err))
        } else {
            Error::NetworkError(err.to_string())
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::DecodeError(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidInput(format!("bad URL: {}", err))
    }
}
