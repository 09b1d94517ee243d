// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic hash embedder for development and tests.
//!
//! Hashes each character into a fixed 512-bucket histogram and
//! L2-normalizes the result. No network, no model download, and fully
//! deterministic, so texts sharing characters score real similarity.
//! Rejected at startup in production.

use async_trait::async_trait;
use mnemo_core::traits::EmbeddingAdapter;
use mnemo_core::types::EmbeddingKind;
use mnemo_core::MnemoError;

/// Output dimension of the hash embedder.
pub const SIMPLE_EMBEDDING_DIM: usize = 512;

/// FNV-1a 32-bit prime, used to spread adjacent code points across buckets.
const FNV_PRIME: u32 = 16_777_619;
const FNV_OFFSET: u32 = 2_166_136_261;

/// `simple` embedding variant: character histogram hashing.
#[derive(Debug, Default, Clone)]
pub struct SimpleEmbedder;

impl SimpleEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Embed a single text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; SIMPLE_EMBEDDING_DIM];
        for ch in text.chars() {
            let mut hash = FNV_OFFSET;
            for byte in (ch as u32).to_le_bytes() {
                hash ^= u32::from(byte);
                hash = hash.wrapping_mul(FNV_PRIME);
            }
            vec[(hash as usize) % SIMPLE_EMBEDDING_DIM] += 1.0;
        }
        l2_normalize(&vec)
    }
}

/// L2-normalize a vector.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}

#[async_trait]
impl EmbeddingAdapter for SimpleEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MnemoError> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        SIMPLE_EMBEDDING_DIM
    }

    fn kind(&self) -> EmbeddingKind {
        EmbeddingKind::Simple
    }
}
