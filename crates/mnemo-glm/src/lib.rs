// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GLM (Zhipu) API integration for mnemo.
//!
//! Provides [`GlmClient`] for the OpenAI-compatible chat-completions and
//! embeddings endpoints, plus the adapter implementations
//! ([`GlmChatAdapter`], [`GlmEmbedder`]) over the core traits.

pub mod adapter;
pub mod client;
pub mod types;

pub use adapter::{GlmChatAdapter, GlmEmbedder, GLM_EMBEDDING_DIM};
pub use client::GlmClient;
