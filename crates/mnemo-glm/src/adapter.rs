// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait implementations over the GLM client.

use async_trait::async_trait;
use mnemo_core::traits::{ChatAdapter, EmbeddingAdapter};
use mnemo_core::types::{CompletionRequest, CompletionResponse, EmbeddingKind, TokenUsage};
use mnemo_core::MnemoError;

use crate::client::GlmClient;
use crate::types::{ApiMessage, ChatCompletionRequest};

/// Output dimension of Zhipu embedding-3.
pub const GLM_EMBEDDING_DIM: usize = 1024;

/// [`ChatAdapter`] backed by the GLM chat-completions endpoint.
///
/// Serves both the reply path and the extraction scoring path; callers set
/// temperature per request.
pub struct GlmChatAdapter {
    client: GlmClient,
    default_model: String,
}

impl GlmChatAdapter {
    pub fn new(client: GlmClient, default_model: String) -> Self {
        Self {
            client,
            default_model,
        }
    }
}

#[async_trait]
impl ChatAdapter for GlmChatAdapter {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, MnemoError> {
        let api_request = ChatCompletionRequest {
            model: request
                .model
                .unwrap_or_else(|| self.default_model.clone()),
            messages: request
                .messages
                .into_iter()
                .map(|turn| ApiMessage {
                    role: turn.role,
                    content: turn.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let response = self.client.chat_completion(&api_request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| MnemoError::Provider {
                message: "chat completion returned no choices".to_string(),
                source: None,
            })?;

        Ok(CompletionResponse {
            content: choice.message.content,
            model: response.model,
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

/// `remote-llm` [`EmbeddingAdapter`] backed by Zhipu embedding-3.
///
/// Vectors are L2-normalized on receipt so cosine similarity reduces to a
/// dot product downstream.
pub struct GlmEmbedder {
    client: GlmClient,
    model: String,
}

impl GlmEmbedder {
    pub fn new(client: GlmClient, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl EmbeddingAdapter for GlmEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MnemoError> {
        let raw = self.client.embedding(&self.model, text).await?;
        if raw.len() != GLM_EMBEDDING_DIM {
            return Err(MnemoError::Embedding {
                message: format!(
                    "embedding dimension {} does not match expected {GLM_EMBEDDING_DIM}",
                    raw.len()
                ),
                source: None,
            });
        }
        Ok(l2_normalize(&raw))
    }

    fn dimension(&self) -> usize {
        GLM_EMBEDDING_DIM
    }

    fn kind(&self) -> EmbeddingKind {
        EmbeddingKind::RemoteLlm
    }
}

/// L2-normalize a vector.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}
