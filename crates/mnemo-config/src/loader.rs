// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order: compiled defaults, then `~/.config/mnemo/mnemo.toml`, then
//! `./mnemo.toml`, then the documented environment keys. The environment
//! layer recognizes exactly the keys the deployment docs name
//! (`REPLY_LLM_API_KEY`, `API_KEY`, `ENVIRONMENT`, ...), each mapped onto
//! its config path.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::MnemoConfig;

/// The environment keys recognized at startup and their config paths.
///
/// Uses explicit mapping, not prefix splitting: the deployment surface is
/// these exact names, and underscore-containing names like
/// `MEMORY_EXTRACT_THRESHOLD` must not be split into nested keys.
const ENV_KEYS: &[(&str, &str)] = &[
    ("REPLY_LLM_API_KEY", "llm.api_key"),
    ("EMBEDDING_API_KEY", "embedding.api_key"),
    ("EMBEDDING_MODEL", "embedding.provider"),
    ("API_KEY", "service.api_key"),
    ("ENVIRONMENT", "service.environment"),
    ("DATA_DIR", "service.data_dir"),
    ("MEMORY_EXTRACT_THRESHOLD", "memory.extract_threshold"),
    ("MAX_CONTEXT_MEMORIES", "memory.max_context_memories"),
    ("HOST", "service.host"),
    ("PORT", "service.port"),
    ("WORKERS", "service.workers"),
];

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<MnemoConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<MnemoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemoConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MnemoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemoConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MnemoConfig::default()))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("mnemo/mnemo.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("mnemo.toml"))
        .merge(env_provider())
}

/// Environment provider mapping the documented keys onto config paths.
fn env_provider() -> Env {
    let names: Vec<&str> = ENV_KEYS.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        let key_str = key.as_str();
        for (name, path) in ENV_KEYS {
            if key_str.eq_ignore_ascii_case(name) {
                return (*path).into();
            }
        }
        key_str.to_lowercase().into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_extract_without_any_sources() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.service.port, 8000);
        assert_eq!(config.llm.model, "glm-4-flash");
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[service]
port = 9001
data_dir = "/var/lib/mnemo"

[memory]
extract_threshold = 3
"#,
        )
        .unwrap();
        assert_eq!(config.service.port, 9001);
        assert_eq!(config.service.data_dir, "/var/lib/mnemo");
        assert_eq!(config.memory.extract_threshold, 3);
    }

    #[test]
    fn unknown_toml_key_is_rejected() {
        let result = load_config_from_str(
            r#"
[service]
prot = 9001
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn documented_env_keys_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("REPLY_LLM_API_KEY", "llm-secret");
            jail.set_env("EMBEDDING_API_KEY", "emb-secret");
            jail.set_env("EMBEDDING_MODEL", "remote-llm");
            jail.set_env("API_KEY", "gate-secret");
            jail.set_env("ENVIRONMENT", "production");
            jail.set_env("DATA_DIR", "/srv/mnemo");
            jail.set_env("MEMORY_EXTRACT_THRESHOLD", "3");
            jail.set_env("MAX_CONTEXT_MEMORIES", "8");
            jail.set_env("HOST", "0.0.0.0");
            jail.set_env("PORT", "9090");
            jail.set_env("WORKERS", "2");

            let config: MnemoConfig = Figment::new()
                .merge(Serialized::defaults(MnemoConfig::default()))
                .merge(env_provider())
                .extract()?;

            assert_eq!(config.llm.api_key.as_deref(), Some("llm-secret"));
            assert_eq!(config.embedding.api_key.as_deref(), Some("emb-secret"));
            assert_eq!(
                config.embedding.provider,
                mnemo_core::types::EmbeddingKind::RemoteLlm
            );
            assert_eq!(config.service.api_key.as_deref(), Some("gate-secret"));
            assert_eq!(
                config.service.environment,
                mnemo_core::types::Environment::Production
            );
            assert_eq!(config.service.data_dir, "/srv/mnemo");
            assert_eq!(config.memory.extract_threshold, 3);
            assert_eq!(config.memory.max_context_memories, 8);
            assert_eq!(config.service.host, "0.0.0.0");
            assert_eq!(config.service.port, 9090);
            assert_eq!(config.service.workers, Some(2));
            Ok(())
        });
    }

    #[test]
    fn unrelated_env_vars_are_ignored() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PATH_STYLE_UNRELATED", "whatever");
            jail.set_env("REPLY_LLM", "not-a-documented-key");
            let config: MnemoConfig = Figment::new()
                .merge(Serialized::defaults(MnemoConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert!(config.llm.api_key.is_none());
            Ok(())
        });
    }
}
