// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the mnemo workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Which side of the conversation produced a message or fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Convert to string for SQLite storage and prompt labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }

    /// Parse from a stored or LLM-returned string. Unknown values are `None`;
    /// callers decide whether that rejects the fragment or the request.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Speaker::User),
            "assistant" => Some(Speaker::Assistant),
            _ => None,
        }
    }
}

/// The (user, session, role) triple that fully partitions memory storage.
///
/// Fragments never cross scopes in retrieval, and deleting a scope removes
/// its fragments atomically from the store's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub user_id: String,
    pub session_id: String,
    pub role_id: String,
}

impl Scope {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        role_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            role_id: role_id.into(),
        }
    }

    /// Deterministic collection name for this scope's store partition.
    pub fn collection_name(&self) -> String {
        format!("{}_{}_{}", self.user_id, self.session_id, self.role_id)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.collection_name())
    }
}

/// A transient record of one chat turn. Messages are the source of memory
/// extraction but are not themselves the memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub session_id: String,
    pub role: Speaker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One turn in an LLM chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// "system", "user", or "assistant".
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A completion request handed to a [`crate::traits::ChatAdapter`].
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model override; empty means the adapter's default model.
    pub model: Option<String>,
    pub messages: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A completion response from a [`crate::traits::ChatAdapter`].
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Token accounting reported by the LLM provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Which embedding provider variant is bound to the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum EmbeddingKind {
    #[strum(serialize = "remote-llm")]
    #[serde(rename = "remote-llm")]
    RemoteLlm,
    #[strum(serialize = "local-transformer")]
    #[serde(rename = "local-transformer")]
    LocalTransformer,
    #[strum(serialize = "simple")]
    #[serde(rename = "simple")]
    Simple,
}

/// Deployment environment. Production forbids the `simple` embedding
/// variant and requires the gateway API key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
pub enum Environment {
    #[strum(serialize = "development")]
    #[serde(rename = "development")]
    #[default]
    Development,
    #[strum(serialize = "production")]
    #[serde(rename = "production")]
    Production,
}
