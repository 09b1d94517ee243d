// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the mnemo service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use mnemo_core::types::{EmbeddingKind, Environment};
use serde::{Deserialize, Serialize};

/// Top-level mnemo configuration.
///
/// Loaded from `mnemo.toml` (XDG hierarchy) with overrides from the
/// documented environment keys. All sections are optional and default to
/// development-friendly values; production hardening is enforced by
/// [`crate::validation::validate_config`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemoConfig {
    /// Process-level settings: environment, listener, data directory.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Reply/scoring LLM settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Memory extraction and buffering settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Default hybrid-retrieval parameters.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Role registry settings.
    #[serde(default)]
    pub roles: RolesConfig,
}

/// Process-level service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Deployment environment: `development` or `production`.
    #[serde(default)]
    pub environment: Environment,

    /// API key gating the HTTP surface. Required in production.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Tokio worker threads. `None` uses the runtime default (CPU count).
    #[serde(default)]
    pub workers: Option<usize>,

    /// Root directory for all persisted state (users, sessions, vector DB).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            api_key: None,
            host: default_host(),
            port: default_port(),
            workers: None,
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Reply and scoring LLM configuration (GLM, OpenAI-compatible endpoint).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// API key for the reply and scoring LLM. Required.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used for replies and extraction scoring.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Sampling temperature for user-facing replies.
    #[serde(default = "default_reply_temperature")]
    pub reply_temperature: f32,

    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            reply_temperature: default_reply_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "glm-4-flash".to_string()
}

fn default_llm_base_url() -> String {
    "https://open.bigmodel.cn/api/paas/v4".to_string()
}

fn default_reply_temperature() -> f32 {
    0.8
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    30
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Provider variant: `remote-llm`, `local-transformer`, or `simple`.
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingKind,

    /// Separate credentials for the remote embedding provider. Falls back
    /// to `llm.api_key` when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Remote embedding model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Remote embedding API base URL.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            model: default_embedding_model(),
            base_url: default_llm_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> EmbeddingKind {
    EmbeddingKind::Simple
}

fn default_embedding_model() -> String {
    "embedding-3".to_string()
}

/// Memory extraction and session buffering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// User turns between automatic extractions.
    #[serde(default = "default_extract_threshold")]
    pub extract_threshold: u64,

    /// Cap on fragments injected into the prompt.
    #[serde(default = "default_max_context_memories")]
    pub max_context_memories: usize,

    /// Soft cap on the per-session in-memory message buffer.
    #[serde(default = "default_buffer_cap")]
    pub buffer_cap: usize,

    /// Background extraction worker count.
    #[serde(default = "default_extraction_workers")]
    pub extraction_workers: usize,

    /// Sampling temperature for the scoring LLM call.
    #[serde(default = "default_scoring_temperature")]
    pub scoring_temperature: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            extract_threshold: default_extract_threshold(),
            max_context_memories: default_max_context_memories(),
            buffer_cap: default_buffer_cap(),
            extraction_workers: default_extraction_workers(),
            scoring_temperature: default_scoring_temperature(),
        }
    }
}

fn default_extract_threshold() -> u64 {
    5
}

fn default_max_context_memories() -> usize {
    5
}

fn default_buffer_cap() -> usize {
    50
}

fn default_extraction_workers() -> usize {
    4
}

fn default_scoring_temperature() -> f32 {
    0.1
}

/// Default hybrid-retrieval parameters. Per-call overrides are passed as a
/// value through the orchestrator; this section only sets the process default.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_min_importance")]
    pub min_importance: i32,

    /// Optional floor on the hybrid score, in [0, 1].
    #[serde(default)]
    pub score_threshold: Option<f32>,

    #[serde(default = "default_true")]
    pub boost_recent: bool,

    #[serde(default = "default_true")]
    pub boost_importance: bool,

    /// Penalty applied against already-selected fragments, in [0, 1].
    #[serde(default = "default_diversity_penalty")]
    pub diversity_penalty: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_importance: default_min_importance(),
            score_threshold: None,
            boost_recent: true,
            boost_importance: true,
            diversity_penalty: default_diversity_penalty(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_min_importance() -> i32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_diversity_penalty() -> f32 {
    0.1
}

/// Role registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RolesConfig {
    /// Directory of role profile JSON files.
    #[serde(default = "default_roles_dir")]
    pub config_dir: String,

    /// Role used when a chat request does not name one.
    #[serde(default = "default_role_id")]
    pub default_role_id: String,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            config_dir: default_roles_dir(),
            default_role_id: default_role_id(),
        }
    }
}

fn default_roles_dir() -> String {
    "./config/roles".to_string()
}

fn default_role_id() -> String {
    "companion_warm".to_string()
}
