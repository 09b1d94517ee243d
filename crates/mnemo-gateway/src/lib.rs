// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface for the mnemo service.
//!
//! Routes: chat (plain and OpenAI-compatible), memory listing, user and
//! session CRUD, and an unauthenticated health endpoint. All `/v1` routes
//! pass the `X-API-Key` middleware.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use server::{build_router, start_server, GatewayState, HealthState, ServerConfig};
