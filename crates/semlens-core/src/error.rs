//! Error types for Semantic Lens.
//!
//! Errors are organized by stage so messages carry the context a user needs
//! to act on them (file paths, model files, which input was missing).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Semantic Lens operations.
#[derive(Error, Debug)]
pub enum LensError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline errors (input, decode, model inference)
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The request is missing the image or the description
    #[error("Missing input: please provide both an image and a text description ({field} is empty)")]
    MissingInput { field: &'static str },

    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Unsupported image format
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// A model file is missing or could not be loaded
    #[error("Model error ({path}): {message}")]
    Model { path: PathBuf, message: String },

    /// Caption generation failed
    #[error("Captioning failed: {message}")]
    Caption { message: String },

    /// Image-text embedding or similarity failed
    #[error("Alignment failed: {message}")]
    Alignment { message: String },

    /// A blocking worker task panicked or was cancelled
    #[error("Worker task failed during {stage}: {message}")]
    Worker { stage: &'static str, message: String },
}

/// Convenience type alias for Semantic Lens results.
pub type Result<T> = std::result::Result<T, LensError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_message_names_field() {
        let err = PipelineError::MissingInput { field: "text" };
        let msg = err.to_string();
        assert!(msg.contains("both an image and a text description"));
        assert!(msg.contains("text is empty"));
    }

    #[test]
    fn test_pipeline_error_converts_to_lens_error() {
        let err: LensError = PipelineError::FileNotFound(PathBuf::from("/nope.png")).into();
        assert!(matches!(err, LensError::Pipeline(_)));
        assert!(err.to_string().contains("/nope.png"));
    }
}
