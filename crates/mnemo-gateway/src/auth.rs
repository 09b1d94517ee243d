// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `X-API-Key` authentication middleware.
//!
//! Required in production (startup validation guarantees a key is
//! configured there); optional in development, where requests pass when
//! no key is set. A missing header is 401, a wrong key is 403.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use mnemo_core::types::Environment;
use serde_json::json;

/// Header carrying the gateway API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication configuration for the gateway.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected API key. `None` disables auth (development only).
    pub api_key: Option<String>,
    pub environment: Environment,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("environment", &self.environment)
            .finish()
    }
}

/// Middleware validating the `X-API-Key` header.
pub async fn api_key_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let Some(expected) = auth.api_key.as_deref() else {
        // No key configured. Development passes; production fails closed
        // (validation refuses this at startup, so this is a backstop).
        if auth.environment == Environment::Development {
            return Ok(next.run(request).await);
        }
        tracing::error!("production gateway has no API key configured, rejecting request");
        return Err(reject(StatusCode::UNAUTHORIZED, "API key missing"));
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        None => Err(reject(StatusCode::UNAUTHORIZED, "API key missing")),
        Some(key) if key == expected => Ok(next.run(request).await),
        Some(_) => Err(reject(StatusCode::FORBIDDEN, "API key invalid")),
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
