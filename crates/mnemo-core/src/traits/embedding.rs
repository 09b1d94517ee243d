// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::MnemoError;
use crate::types::EmbeddingKind;

/// Adapter for generating vector embeddings from text.
///
/// `embed` is pure: the same text yields the same vector for the lifetime
/// of an adapter instance. The dimension is a construction-time constant
/// that the store validates against its existing collections; switching
/// variants on a populated store is a startup refusal.
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync {
    /// Embeds a single text into an L2-normalized vector of `dimension()` floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MnemoError>;

    /// Embeds a batch of texts. Must be at least as efficient as calling
    /// [`embed`](Self::embed) in a loop.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MnemoError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// The fixed output dimension of this adapter.
    fn dimension(&self) -> usize;

    /// Which provider variant this adapter is.
    fn kind(&self) -> EmbeddingKind;
}
