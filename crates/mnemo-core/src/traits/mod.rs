// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the pluggable provider seams.
//!
//! Both traits use `#[async_trait]` for dynamic dispatch compatibility;
//! the store and orchestrator hold `Arc<dyn _>` references for their
//! whole lifetime.

pub mod chat;
pub mod embedding;

pub use chat::ChatAdapter;
pub use embedding::EmbeddingAdapter;
