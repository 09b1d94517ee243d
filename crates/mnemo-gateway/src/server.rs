// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, auth middleware, and shared state.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use mnemo_chat::ChatOrchestrator;
use mnemo_core::types::{EmbeddingKind, Environment};
use mnemo_core::MnemoError;
use mnemo_identity::{SessionStore, UserStore};
use mnemo_memory::MemoryStore;
use tower_http::cors::CorsLayer;

use crate::auth::{api_key_middleware, AuthConfig};
use crate::handlers;

/// Static health facts reported by `/health`.
#[derive(Clone)]
pub struct HealthState {
    pub embedding: EmbeddingKind,
    pub environment: Environment,
    pub start_time: std::time::Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub users: Arc<UserStore>,
    pub sessions: Arc<SessionStore>,
    pub store: Arc<MemoryStore>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

/// Gateway listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the full router: `/health` is public, everything under `/v1`
/// passes the API-key middleware.
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/chat", post(handlers::post_chat))
        .route("/v1/chat/completions", post(handlers::post_chat_completions))
        .route("/v1/memories", get(handlers::get_memories))
        .route("/v1/users", post(handlers::post_users))
        .route("/v1/users/{id}", get(handlers::get_user))
        .route("/v1/users/{id}/sessions", get(handlers::get_user_sessions))
        .route("/v1/sessions", post(handlers::post_sessions))
        .route("/v1/sessions/{id}", get(handlers::get_session))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            api_key_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the process is stopped.
pub async fn start_server(config: &ServerConfig, state: GatewayState) -> Result<(), MnemoError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MnemoError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| MnemoError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
