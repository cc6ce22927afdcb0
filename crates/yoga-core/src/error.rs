//! Error types for the yoga pose dataset pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for dataset preparation.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding error
    #[error("Image processing error: {0}")]
    Image(String),

    /// A single file could not be decoded, converted or encoded.
    ///
    /// Only ever raised inside the normalizer's per-file loop, where it is
    /// recorded as a skip rather than propagated.
    #[error("Corrupt or unsupported image {}: {reason}", path.display())]
    CorruptOrUnsupportedImage { path: PathBuf, reason: String },

    /// Source pool or destination tree is unusable
    #[error("Invalid dataset state: {0}")]
    InvalidDatasetState(String),

    /// Image has a non-positive dimension
    #[error("Malformed image: {0}")]
    MalformedImage(String),

    /// Split ratios are negative or do not sum to 1.0
    #[error("Invalid split ratios: {0}")]
    InvalidSplitRatios(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

/// Specialized Result type for dataset preparation.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidSplitRatios("sum is 0.9".to_string());
        assert_eq!(err.to_string(), "Invalid split ratios: sum is 0.9");
    }

    #[test]
    fn test_corrupt_image_names_path() {
        let err = Error::CorruptOrUnsupportedImage {
            path: PathBuf::from("data/tree/broken.png"),
            reason: "unexpected end of file".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("broken.png"));
        assert!(message.contains("unexpected end of file"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
