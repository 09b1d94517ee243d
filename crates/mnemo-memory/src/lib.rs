// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory subsystem for the mnemo service.
//!
//! Turns conversation windows into persistent, searchable memory
//! fragments and selects a small, diverse context set for each turn.
//!
//! ## Architecture
//!
//! - **SimpleEmbedder**: deterministic hash embedding (dev/test only)
//! - **OnnxEmbedder**: local multilingual sentence encoder (`onnx` feature)
//! - **ModelManager**: first-run model download from HuggingFace
//! - **MemoryStore**: SQLite persistence, per-scope collections, BLOB vectors
//! - **MemoryExtractor**: scoring-LLM extraction with rule-based correction
//! - **HybridRetriever**: similarity + importance + recency + diversity
//! - **scoring**: marker sets and differentiated thresholds

pub mod extractor;
pub mod retriever;
pub mod scoring;
pub mod simple;
pub mod store;
pub mod types;

#[cfg(feature = "onnx")]
pub mod embedder;
#[cfg(feature = "onnx")]
pub mod model_manager;

pub use extractor::MemoryExtractor;
pub use retriever::{HybridRetriever, RetrievalConfig};
pub use simple::{SimpleEmbedder, SIMPLE_EMBEDDING_DIM};
pub use store::MemoryStore;
pub use types::*;

#[cfg(feature = "onnx")]
pub use embedder::{OnnxEmbedder, ONNX_EMBEDDING_DIM};
#[cfg(feature = "onnx")]
pub use model_manager::ModelManager;
