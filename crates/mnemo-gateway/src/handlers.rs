// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the REST API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mnemo_chat::ChatOptions;
use mnemo_core::types::Speaker;
use mnemo_core::MnemoError;
use mnemo_identity::Session;
use mnemo_memory::{MemoryFragment, QueryFilters};
use serde::{Deserialize, Serialize};

use crate::server::GatewayState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map an error to its HTTP status.
fn status_for(err: &MnemoError) -> StatusCode {
    match err {
        MnemoError::AuthMissing => StatusCode::UNAUTHORIZED,
        MnemoError::AuthInvalid => StatusCode::FORBIDDEN,
        MnemoError::UnknownUser(_) | MnemoError::UnknownSession(_) => StatusCode::NOT_FOUND,
        MnemoError::InvalidRole(_) => StatusCode::BAD_REQUEST,
        MnemoError::Provider { .. } | MnemoError::Timeout { .. } => StatusCode::BAD_GATEWAY,
        MnemoError::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,
        MnemoError::Config(_)
        | MnemoError::MalformedOutput(_)
        | MnemoError::Embedding { .. }
        | MnemoError::DimensionMismatch { .. }
        | MnemoError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: MnemoError) -> Response {
    let status = status_for(&err);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// --- Chat ---

/// Request body for POST /v1/chat.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub role_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub extract_now: bool,
    #[serde(default)]
    pub min_importance: Option<i32>,
    #[serde(default)]
    pub max_context_memories: Option<usize>,
}

/// Response body for POST /v1/chat.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub user_id: String,
    pub memory_extracted: bool,
    pub message_count: usize,
}

/// POST /v1/chat
pub async fn post_chat(
    State(state): State<GatewayState>,
    Json(body): Json<ChatRequest>,
) -> Response {
    let options = ChatOptions {
        extract_now: body.extract_now,
        username: body.username,
        min_importance_override: body.min_importance,
        max_context_memories_override: body.max_context_memories,
    };
    match state
        .orchestrator
        .chat(
            &body.user_id,
            body.session_id,
            body.role_id,
            &body.message,
            options,
        )
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ChatResponse {
                response: outcome.reply,
                session_id: outcome.session_id,
                user_id: outcome.user_id,
                memory_extracted: outcome.memory_extracted,
                message_count: outcome.message_count,
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

// --- OpenAI-compatible chat completions ---

/// One message in the OpenAI request shape.
#[derive(Debug, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

/// Request body for POST /v1/chat/completions.
#[derive(Debug, Deserialize)]
pub struct CompletionsRequest {
    #[serde(default = "default_model_name")]
    pub model: String,
    pub messages: Vec<CompletionMessage>,
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub role_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

fn default_model_name() -> String {
    "mnemo".to_string()
}

/// Response body for POST /v1/chat/completions.
#[derive(Debug, Serialize)]
pub struct CompletionsResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: CompletionUsage,
}

#[derive(Debug, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: CompletionMessageOut,
    pub finish_reason: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionMessageOut {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// POST /v1/chat/completions
///
/// OpenAI-compatible single turn: the last user message is the turn text;
/// memory semantics are identical to /v1/chat.
pub async fn post_chat_completions(
    State(state): State<GatewayState>,
    Json(body): Json<CompletionsRequest>,
) -> Response {
    let Some(user_message) = body
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "no user message in request".to_string(),
            }),
        )
            .into_response();
    };

    let options = ChatOptions {
        username: body.username,
        ..Default::default()
    };
    match state
        .orchestrator
        .chat(
            &body.user_id,
            body.session_id,
            body.role_id,
            &user_message,
            options,
        )
        .await
    {
        Ok(outcome) => {
            let prompt_tokens = user_message.chars().count();
            let completion_tokens = outcome.reply.chars().count();
            (
                StatusCode::OK,
                Json(CompletionsResponse {
                    id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
                    object: "chat.completion".to_string(),
                    created: chrono::Utc::now().timestamp(),
                    model: body.model,
                    choices: vec![CompletionChoice {
                        index: 0,
                        message: CompletionMessageOut {
                            role: "assistant".to_string(),
                            content: outcome.reply,
                        },
                        finish_reason: "stop".to_string(),
                    }],
                    usage: CompletionUsage {
                        prompt_tokens,
                        completion_tokens,
                        total_tokens: prompt_tokens + completion_tokens,
                    },
                }),
            )
                .into_response()
        }
        Err(err) => error_response(err),
    }
}

// --- Memories ---

/// Query parameters for GET /v1/memories.
#[derive(Debug, Deserialize)]
pub struct MemoriesQuery {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub role_id: Option<String>,
    #[serde(default = "default_memories_limit")]
    pub limit: usize,
    #[serde(default)]
    pub min_importance: Option<i32>,
    #[serde(default)]
    pub speaker: Option<String>,
}

fn default_memories_limit() -> usize {
    50
}

/// Response body for GET /v1/memories.
#[derive(Debug, Serialize)]
pub struct MemoriesResponse {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    pub total_count: usize,
    pub memories: Vec<MemoryFragment>,
}

/// GET /v1/memories
pub async fn get_memories(
    State(state): State<GatewayState>,
    Query(query): Query<MemoriesQuery>,
) -> Response {
    // Session ownership check when a session is named.
    if let Some(session_id) = &query.session_id {
        match state.sessions.get(session_id).await {
            None => {
                return error_response(MnemoError::UnknownSession(session_id.clone()));
            }
            Some(session) if session.user_id != query.user_id => {
                return error_response(MnemoError::AuthInvalid);
            }
            Some(_) => {}
        }
    }

    let speaker = match query.speaker.as_deref() {
        None => None,
        Some(s) => match Speaker::parse(s) {
            Some(speaker) => Some(speaker),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: format!("invalid speaker filter `{s}`"),
                    }),
                )
                    .into_response();
            }
        },
    };

    let filters = QueryFilters {
        min_importance: query.min_importance,
        speaker,
        kind: None,
    };
    match state
        .store
        .list_matching(
            &query.user_id,
            query.session_id.as_deref(),
            query.role_id.as_deref(),
            query.limit,
            &filters,
        )
        .await
    {
        Ok(memories) => (
            StatusCode::OK,
            Json(MemoriesResponse {
                user_id: query.user_id,
                session_id: query.session_id,
                role_id: query.role_id,
                total_count: memories.len(),
                memories,
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

// --- Users ---

/// Request body for POST /v1/users.
#[derive(Debug, Deserialize)]
pub struct UserCreateRequest {
    pub username: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /v1/users
pub async fn post_users(
    State(state): State<GatewayState>,
    Json(body): Json<UserCreateRequest>,
) -> Response {
    match state.users.create(&body.username, body.user_id).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /v1/users/{id}
pub async fn get_user(State(state): State<GatewayState>, Path(user_id): Path<String>) -> Response {
    match state.users.get(&user_id).await {
        Some(user) => (StatusCode::OK, Json(user)).into_response(),
        None => error_response(MnemoError::UnknownUser(user_id)),
    }
}

// --- Sessions ---

/// Request body for POST /v1/sessions.
#[derive(Debug, Deserialize)]
pub struct SessionCreateRequest {
    pub user_id: String,
    #[serde(default = "default_session_title")]
    pub title: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_session_title() -> String {
    "新对话".to_string()
}

/// Session summary returned by the API (history omitted).
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub user_id: String,
    pub title: String,
    pub message_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.session_id,
            user_id: session.user_id,
            title: session.title,
            message_count: session.message_count,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Response body for GET /v1/users/{id}/sessions.
#[derive(Debug, Serialize)]
pub struct UserSessionsResponse {
    pub user_id: String,
    pub total_sessions: usize,
    pub sessions: Vec<SessionResponse>,
}

/// POST /v1/sessions
pub async fn post_sessions(
    State(state): State<GatewayState>,
    Json(body): Json<SessionCreateRequest>,
) -> Response {
    if state.users.get(&body.user_id).await.is_none() {
        return error_response(MnemoError::UnknownUser(body.user_id));
    }
    match state
        .sessions
        .create(&body.user_id, &body.title, body.session_id)
        .await
    {
        Ok(session) => (StatusCode::OK, Json(SessionResponse::from(session))).into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /v1/sessions/{id}
pub async fn get_session(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.sessions.get(&session_id).await {
        Some(session) => (StatusCode::OK, Json(SessionResponse::from(session))).into_response(),
        None => error_response(MnemoError::UnknownSession(session_id)),
    }
}

/// GET /v1/users/{id}/sessions
pub async fn get_user_sessions(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
) -> Response {
    if state.users.get(&user_id).await.is_none() {
        return error_response(MnemoError::UnknownUser(user_id));
    }
    let sessions: Vec<SessionResponse> = state
        .sessions
        .list_for_user(&user_id)
        .await
        .into_iter()
        .map(SessionResponse::from)
        .collect();
    (
        StatusCode::OK,
        Json(UserSessionsResponse {
            user_id,
            total_sessions: sessions.len(),
            sessions,
        }),
    )
        .into_response()
}

// --- Health ---

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub embedding_model: String,
    pub environment: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embedding_model: state.health.embedding.to_string(),
        environment: state.health.environment.to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_deserializes_minimal_body() {
        let json = r#"{"user_id": "u1", "message": "你好"}"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.user_id, "u1");
        assert_eq!(req.message, "你好");
        assert!(req.session_id.is_none());
        assert!(!req.extract_now);
    }

    #[test]
    fn chat_request_deserializes_all_fields() {
        let json = r#"{
            "user_id": "u1",
            "session_id": "s1",
            "role_id": "companion_warm",
            "message": "你好",
            "username": "张三",
            "extract_now": true,
            "min_importance": 6,
            "max_context_memories": 3
        }"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.role_id.as_deref(), Some("companion_warm"));
        assert!(req.extract_now);
        assert_eq!(req.min_importance, Some(6));
        assert_eq!(req.max_context_memories, Some(3));
    }

    #[test]
    fn completions_request_requires_messages() {
        let json = r#"{"user_id": "u1", "messages": [{"role": "user", "content": "hi"}]}"#;
        let req: CompletionsRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.model, "mnemo");
    }

    #[test]
    fn memories_query_defaults() {
        let query: MemoriesQuery =
            serde_json::from_value(serde_json::json!({"user_id": "u1"})).unwrap();
        assert_eq!(query.limit, 50);
        assert!(query.speaker.is_none());
        assert!(query.session_id.is_none());
        assert!(query.min_importance.is_none());
    }

    #[test]
    fn error_status_mapping_matches_contract() {
        assert_eq!(status_for(&MnemoError::AuthMissing), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&MnemoError::AuthInvalid), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&MnemoError::UnknownUser("u".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&MnemoError::UnknownSession("s".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&MnemoError::InvalidRole("r".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&MnemoError::Provider {
                message: "down".into(),
                source: None
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&MnemoError::Timeout {
                duration: std::time::Duration::from_secs(30)
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&MnemoError::Storage {
                source: Box::new(std::io::Error::other("disk"))
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn error_response_serializes() {
        let resp = ErrorResponse {
            error: "API key missing".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("API key missing"));
    }
}
