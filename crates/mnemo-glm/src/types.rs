// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GLM (Zhipu) API request/response types.
//!
//! The Zhipu endpoint speaks the OpenAI chat-completions and embeddings
//! wire format; these types cover the subset mnemo uses.

use serde::{Deserialize, Serialize};

// --- Chat completion types ---

/// A request to the chat completions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// Model identifier (e.g., "glm-4-flash").
    pub model: String,

    /// Conversation messages, system turn first.
    pub messages: Vec<ApiMessage>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Whether to stream the response. Always false in mnemo.
    pub stream: bool,
}

/// A single message in the OpenAI conversation format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    /// Role: "system", "user", or "assistant".
    pub role: String,
    /// Plain text content.
    pub content: String,
}

/// A response from the chat completions endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

/// One completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ApiMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage reported by the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

// --- Embedding types ---

/// A request to the embeddings endpoint. Zhipu's embedding-3 accepts one
/// input string per request.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: String,
}

/// A response from the embeddings endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingDatum>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

/// One embedding vector in the response.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingDatum {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub index: u32,
}

// --- Error types ---

/// Error body returned by the API on failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

/// Error detail within an API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_openai_shape() {
        let request = ChatCompletionRequest {
            model: "glm-4-flash".into(),
            messages: vec![
                ApiMessage {
                    role: "system".into(),
                    content: "You are helpful.".into(),
                },
                ApiMessage {
                    role: "user".into(),
                    content: "你好".into(),
                },
            ],
            temperature: 0.8,
            max_tokens: 1024,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "glm-4-flash");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "你好");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn chat_response_deserializes() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "glm-4-flash",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "你好！"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content, "你好！");
        assert_eq!(response.usage.as_ref().unwrap().total_tokens, 16);
    }

    #[test]
    fn embedding_response_deserializes() {
        let body = r#"{
            "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}],
            "model": "embedding-3"
        }"#;
        let response: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.data[0].embedding, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn api_error_deserializes_without_code() {
        let body = r#"{"error": {"message": "Invalid API key"}}"#;
        let err: ApiErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(err.error.message, "Invalid API key");
        assert!(err.error.code.is_none());
    }
}
