// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes. Collects all errors instead of failing fast so a broken
//! deployment gets one complete report.

use mnemo_core::types::{EmbeddingKind, Environment};

use crate::diagnostic::ConfigError;
use crate::model::MnemoConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)`
/// with every collected error.
pub fn validate_config(config: &MnemoConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // The reply/scoring LLM key is always required.
    if config.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
        errors.push(ConfigError::MissingKey {
            key: "llm.api_key (REPLY_LLM_API_KEY)".to_string(),
        });
    }

    // Production hardening: the HTTP surface must be gated.
    if config.service.environment == Environment::Production
        && config.service.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
    {
        errors.push(ConfigError::MissingKey {
            key: "service.api_key (API_KEY) — required in production".to_string(),
        });
    }

    // Production forbids the deterministic hash embedder.
    if config.service.environment == Environment::Production
        && config.embedding.provider == EmbeddingKind::Simple
    {
        errors.push(ConfigError::Validation {
            message: "embedding.provider `simple` is forbidden in production; \
                      use `remote-llm` or `local-transformer`"
                .to_string(),
        });
    }

    if config.service.data_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "service.data_dir must not be empty".to_string(),
        });
    }

    if config.service.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "service.host must not be empty".to_string(),
        });
    }

    if config.memory.extract_threshold == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.extract_threshold must be at least 1".to_string(),
        });
    }

    if config.memory.extraction_workers == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.extraction_workers must be at least 1".to_string(),
        });
    }

    if config.retrieval.top_k == 0 {
        errors.push(ConfigError::Validation {
            message: "retrieval.top_k must be at least 1".to_string(),
        });
    }

    if !(1..=10).contains(&config.retrieval.min_importance) {
        errors.push(ConfigError::Validation {
            message: format!(
                "retrieval.min_importance must be in 1..=10, got {}",
                config.retrieval.min_importance
            ),
        });
    }

    if !(0.0..=1.0).contains(&config.retrieval.diversity_penalty) {
        errors.push(ConfigError::Validation {
            message: format!(
                "retrieval.diversity_penalty must be in [0, 1], got {}",
                config.retrieval.diversity_penalty
            ),
        });
    }

    if let Some(threshold) = config.retrieval.score_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "retrieval.score_threshold must be in [0, 1], got {threshold}"
                ),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
