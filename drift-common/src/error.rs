//! Error types for the drift workspace.

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias using the drift error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for drift crates.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid input table or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error stems from configuration (loading or validation).
    pub fn is_config(&self) -> bool {
        match self {
            Self::Config(_) | Self::Validation(_) => true,
            Self::WithContext { source, .. } => source.is_config(),
            _ => false,
        }
    }

    /// Check if this error stems from a malformed input table.
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Self::InvalidInput(_) | Self::Json(_) => true,
            Self::WithContext { source, .. } => source.is_invalid_input(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::Config("bad".into()).is_config());
        assert!(Error::InvalidInput("empty".into()).is_invalid_input());
        assert!(!Error::InvalidInput("empty".into()).is_config());
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::InvalidInput("vote table is empty".into());
        let with_ctx = err.with_context("loading votes");
        assert!(matches!(with_ctx, Error::WithContext { .. }));
        assert!(with_ctx.is_invalid_input());
        assert_eq!(
            with_ctx.to_string(),
            "loading votes: Invalid input: vote table is empty"
        );
    }

    #[test]
    fn test_result_ext_context() {
        let parsed: std::result::Result<u32, serde_json::Error> = serde_json::from_str("nope");
        let err = parsed.context("parsing rows").unwrap_err();
        assert!(err.is_invalid_input());
    }
}
