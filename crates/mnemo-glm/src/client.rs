// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the GLM (Zhipu) OpenAI-compatible API.
//!
//! Provides [`GlmClient`] which handles request construction,
//! authentication, transient error retry with exponential backoff, and
//! typed error decoding for both chat completions and embeddings.

use std::time::Duration;

use mnemo_core::MnemoError;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::types::{
    ApiErrorResponse, ChatCompletionRequest, ChatCompletionResponse, EmbeddingRequest,
    EmbeddingResponse,
};

/// Maximum retry attempts after the first request (3 attempts total).
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff; doubles per attempt, total < 5 s.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// HTTP client for the GLM API.
///
/// Manages authentication headers, connection pooling, and retry logic for
/// transient errors (429, 5xx).
#[derive(Debug, Clone)]
pub struct GlmClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GlmClient {
    /// Creates a new GLM API client.
    ///
    /// # Arguments
    /// * `api_key` - Zhipu API key sent as a bearer token
    /// * `base_url` - API base URL (e.g., "https://open.bigmodel.cn/api/paas/v4")
    /// * `timeout` - per-request timeout
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, MnemoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| MnemoError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| MnemoError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Sends a chat completion request and returns the full response.
    ///
    /// Transient errors (429, 5xx) are retried with exponential backoff.
    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, MnemoError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.post_with_retry(&url, request).await?;
        serde_json::from_str(&body).map_err(|e| MnemoError::Provider {
            message: format!("failed to parse chat completion response: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// Embeds a single text, returning the raw (unnormalized) vector.
    pub async fn embedding(&self, model: &str, input: &str) -> Result<Vec<f32>, MnemoError> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: model.to_string(),
            input: input.to_string(),
        };
        let body = self.post_with_retry(&url, &request).await?;
        let response: EmbeddingResponse =
            serde_json::from_str(&body).map_err(|e| MnemoError::Embedding {
                message: format!("failed to parse embedding response: {e}"),
                source: Some(Box::new(e)),
            })?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MnemoError::Embedding {
                message: "embedding response contained no data".to_string(),
                source: None,
            })
    }

    /// POST a JSON body with transient-error retry; returns the response body.
    async fn post_with_retry<T: serde::Serialize>(
        &self,
        url: &str,
        request: &T,
    ) -> Result<String, MnemoError> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(url).json(request).send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return Err(MnemoError::Timeout {
                        duration: self.timeout,
                    });
                }
                Err(e) => {
                    return Err(MnemoError::Provider {
                        message: format!("HTTP request failed: {e}"),
                        source: Some(Box::new(e)),
                    });
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, "GLM response received");

            if status.is_success() {
                return response.text().await.map_err(|e| MnemoError::Provider {
                    message: format!("failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                });
            }

            let body = response.text().await.unwrap_or_default();

            if is_transient_error(status) && attempt < MAX_RETRIES {
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(MnemoError::Provider {
                    message: format!("API returned {status}: {body}"),
                    source: None,
                });
                continue;
            }

            // Non-transient error or exhausted retries.
            let message = if let Ok(api_err) = serde_json::from_str::<ApiErrorResponse>(&body) {
                match api_err.error.code {
                    Some(code) => format!("GLM API error ({code}): {}", api_err.error.message),
                    None => format!("GLM API error: {}", api_err.error.message),
                }
            } else {
                format!("API returned {status}: {body}")
            };
            return Err(MnemoError::Provider {
                message,
                source: None,
            });
        }

        Err(last_error.unwrap_or_else(|| MnemoError::Provider {
            message: "request failed after retries".into(),
            source: None,
        }))
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}
