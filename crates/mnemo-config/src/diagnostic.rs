// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration error types surfaced at startup.

use thiserror::Error;

/// A configuration error detected during loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    MissingKey { key: String },

    /// A semantic validation failure for a config value.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Catch-all for other configuration errors (figment extraction, I/O).
    #[error("configuration error: {0}")]
    Other(String),
}

/// Render a list of collected config errors as a single startup message.
pub fn render_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}
