// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the mnemo memory-augmented chat service.

use thiserror::Error;

/// The primary error type used across all mnemo crates.
///
/// Variants mirror the failure surface of the service: configuration and
/// startup errors are fatal, identity lookups map to 4xx responses, and
/// LLM/embedding/storage failures are either surfaced (reply path) or
/// swallowed with a log line (memory path).
#[derive(Debug, Error)]
pub enum MnemoError {
    /// Configuration errors (invalid TOML, missing required keys, startup refusals).
    #[error("configuration error: {0}")]
    Config(String),

    /// The request carried no `X-API-Key` header (401).
    #[error("authentication failed: API key missing")]
    AuthMissing,

    /// The request carried a wrong `X-API-Key` value (403).
    #[error("authentication failed: API key invalid")]
    AuthInvalid,

    /// Referenced user does not exist.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Referenced session does not exist.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// Referenced role is not in the loaded registry.
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// LLM provider errors (API failure, non-transient status, bad payload).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The scoring LLM returned output that does not match the fragment schema.
    #[error("malformed LLM output: {0}")]
    MalformedOutput(String),

    /// Embedding provider errors (network failure after retries, bad response).
    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage backend errors (database connection, query failure, file I/O).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The bound embedding adapter's dimension does not match an existing
    /// collection. Raised at startup; switching adapters on a populated
    /// store requires a fresh store.
    #[error("dimension mismatch for collection {collection}: store has {expected}, adapter produces {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_display_distinguishes_missing_from_invalid() {
        assert!(MnemoError::AuthMissing.to_string().contains("missing"));
        assert!(MnemoError::AuthInvalid.to_string().contains("invalid"));
    }

    #[test]
    fn dimension_mismatch_names_collection() {
        let err = MnemoError::DimensionMismatch {
            collection: "u1_s1_r1".into(),
            expected: 384,
            actual: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("u1_s1_r1"));
        assert!(msg.contains("384"));
        assert!(msg.contains("1024"));
    }
}
