//! Error types for cloud-init-seed

use std::fmt;
use thiserror::Error;

/// Stage of image assembly an error originated from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStage {
    /// Opening the image writer
    Open,
    /// Adding a file at the given internal path
    AddFile(String),
    /// Finalizing the image to the output sink
    Finalize,
}

impl fmt::Display for ImageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageStage::Open => write!(f, "open"),
            ImageStage::AddFile(path) => write!(f, "add file '{}'", path),
            ImageStage::Finalize => write!(f, "finalize"),
        }
    }
}

/// Main error type for cloud-init-seed operations
#[derive(Error, Debug)]
pub enum CloudInitError {
    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    #[error("Failed to hash password for user '{user}': {message}")]
    PasswordHash { user: String, message: String },

    #[error("Metadata for {expected} cannot be set on a {actual} configuration")]
    MetadataMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Image {stage} failed: {source}")]
    Image {
        stage: ImageStage,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudInitError {
    /// Create an image assembly error for a stage
    pub fn image(stage: ImageStage, source: std::io::Error) -> Self {
        Self::Image { stage, source }
    }

    /// Create a metadata mismatch error
    pub fn mismatch(expected: &'static str, actual: &'static str) -> Self {
        Self::MetadataMismatch { expected, actual }
    }
}
