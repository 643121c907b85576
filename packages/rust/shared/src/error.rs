//! Error types for Slidecast.
//!
//! Library crates use [`SlidecastError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Slidecast operations.
#[derive(Debug, thiserror::Error)]
pub enum SlidecastError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network or provider failure from the text-generation or speech service.
    #[error("service error: {0}")]
    TransientService(String),

    /// Generated structured output did not match the slide record schema.
    #[error("schema validation error: {message}")]
    SchemaValidation { message: String },

    /// An upstream artifact the current step depends on is absent.
    #[error("missing artifact: {key}")]
    MissingArtifact { key: String },

    /// Blob store or database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input or aggregated data failed an invariant check.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Audio payload could not be decoded or encoded.
    #[error("audio error: {0}")]
    Audio(String),

    /// A spawned worker panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),

    /// A batch exhausted its retry budget.
    #[error(
        "batch {batch_id} failed during {stage} \
         (narrative attempts: {narrative_attempts}, json attempts: {json_attempts}): {last_error}"
    )]
    BatchFailed {
        batch_id: String,
        stage: String,
        narrative_attempts: u32,
        json_attempts: u32,
        last_error: String,
    },

    /// An audio unit exhausted its retry budget.
    #[error("synthesis of unit {index} (slide {slide}) failed: {last_error}")]
    SynthesisFailed {
        index: usize,
        slide: u32,
        last_error: String,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SlidecastError>;

impl SlidecastError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a schema validation error from any displayable message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaValidation {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a missing-artifact error for a blob key.
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingArtifact { key: key.into() }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a stage may absorb this failure and try again.
    ///
    /// Only service failures and schema mismatches are retryable; everything
    /// else aborts the surrounding step immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientService(_) | Self::SchemaValidation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SlidecastError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = SlidecastError::missing("presentations/p1/script.json");
        assert!(err.to_string().contains("presentations/p1/script.json"));
    }

    #[test]
    fn retryable_classification() {
        assert!(SlidecastError::TransientService("503".into()).is_retryable());
        assert!(SlidecastError::schema("missing title").is_retryable());
        assert!(!SlidecastError::missing("k").is_retryable());
        assert!(!SlidecastError::Storage("disk full".into()).is_retryable());
        assert!(!SlidecastError::validation("bad").is_retryable());
    }

    #[test]
    fn batch_failed_carries_attempts() {
        let err = SlidecastError::BatchFailed {
            batch_id: "batch_0003".into(),
            stage: "json".into(),
            narrative_attempts: 4,
            json_attempts: 4,
            last_error: "schema validation error: empty title".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("batch_0003"));
        assert!(msg.contains("narrative attempts: 4"));
        assert!(msg.contains("json attempts: 4"));
    }
}
