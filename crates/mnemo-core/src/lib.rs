// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the mnemo memory-augmented chat service.
//!
//! This crate provides the error type, shared domain types, and the two
//! adapter traits (chat and embedding) that the rest of the workspace is
//! built against.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::MnemoError;
pub use traits::{ChatAdapter, EmbeddingAdapter};
pub use types::{
    ChatMessage, ChatTurn, CompletionRequest, CompletionResponse, EmbeddingKind, Environment,
    Scope, Speaker, TokenUsage,
};
