//! Common error types for GalleryStore.

use thiserror::Error;

/// Top-level error type for storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is invalid or names an unknown provider kind.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Network request failed or returned an unexpected status.
    #[error("Network error: {0}")]
    Network(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation is not supported by the backend.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A fallback move uploaded the target but could not remove the source.
    ///
    /// `cause` is the failed source delete. `compensation` holds the error
    /// of the attempt to delete the freshly written target, if that failed
    /// too.
    #[error("Move from '{source_key}' to '{target_key}' incomplete: {cause}")]
    MoveIncomplete {
        source_key: String,
        target_key: String,
        #[source]
        cause: Box<Error>,
        compensation: Option<Box<Error>>,
    },
}

impl Error {
    /// Returns true for errors that report a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_incomplete_exposes_cause() {
        let err = Error::MoveIncomplete {
            source_key: "a.jpg".to_string(),
            target_key: "b.jpg".to_string(),
            cause: Box::new(Error::Storage("delete refused".to_string())),
            compensation: None,
        };

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Storage error: delete refused");
        assert!(err.to_string().contains("'a.jpg'"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("x".to_string()).is_not_found());
        assert!(!Error::Storage("x".to_string()).is_not_found());
    }
}
