//! Error types for venuebot.
//!
//! Library crates use [`VenueBotError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all venuebot operations.
#[derive(Debug, thiserror::Error)]
pub enum VenueBotError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to the venue source.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed response body or request document.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database open/migration error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing identity, bad payload shape, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Neither the explicit reference nor the node carried a venue reference.
    #[error("no venue identifier found for {node}")]
    NoVenueIdentifier { node: String },

    /// The venue-source client has not been configured with credentials.
    #[error("venue source is not configured")]
    SourceUnavailable,

    /// A lookup or discovery query matched nothing.
    #[error("no matching node: {context}")]
    NoMatchingNode { context: String },

    /// The graph backend rejected or failed a query.
    #[error("query failure: {0}")]
    QueryFailure(String),

    /// A deferred task ended without settling its promise.
    #[error("deferred task was abandoned before it settled")]
    Abandoned,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, VenueBotError>;

impl VenueBotError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a no-match error with context.
    pub fn no_match(context: impl Into<String>) -> Self {
        Self::NoMatchingNode {
            context: context.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = VenueBotError::config("missing client secret");
        assert_eq!(err.to_string(), "config error: missing client secret");

        let err = VenueBotError::NoVenueIdentifier {
            node: "urn:uuid:1".into(),
        };
        assert!(err.to_string().contains("urn:uuid:1"));

        let err = VenueBotError::no_match("discovery query returned no rows");
        assert!(err.to_string().starts_with("no matching node"));
    }
}
