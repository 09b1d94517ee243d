// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat adapter for deterministic testing.
//!
//! Responses are popped from a FIFO queue; an empty queue yields a
//! default text. An optional per-call delay simulates slow upstreams.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mnemo_core::traits::ChatAdapter;
use mnemo_core::types::{CompletionRequest, CompletionResponse, TokenUsage};
use mnemo_core::MnemoError;
use tokio::sync::Mutex;

/// A mock LLM chat adapter returning pre-configured responses.
pub struct MockChatAdapter {
    responses: Arc<Mutex<VecDeque<String>>>,
    delay: Duration,
}

impl MockChatAdapter {
    /// Create a mock with an empty response queue.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            delay: Duration::ZERO,
        }
    }

    /// Create a mock pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            delay: Duration::ZERO,
        }
    }

    /// Sleep this long before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Add a response to the end of the queue.
    pub async fn add_response(&self, text: String) {
        self.responses.lock().await.push_back(text);
    }

    async fn next_response(&self) -> String {
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "mock response".to_string())
    }
}

impl Default for MockChatAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatAdapter for MockChatAdapter {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, MnemoError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let content = self.next_response().await;
        Ok(CompletionResponse {
            content,
            model: request.model.unwrap_or_else(|| "mock-model".to_string()),
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
        })
    }
}
