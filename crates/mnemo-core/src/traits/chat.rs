// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat adapter trait for LLM provider integrations.

use async_trait::async_trait;

use crate::error::MnemoError;
use crate::types::{CompletionRequest, CompletionResponse};

/// Adapter for chat-completion LLM providers.
///
/// Serves both the reply path (synchronous, user-facing) and the scoring
/// path (background extraction). Implementations own their retry and
/// timeout policy.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, MnemoError>;
}
