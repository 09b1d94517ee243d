// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types for the fragment store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mnemo_core::types::Speaker;
use serde::{Deserialize, Serialize};

/// A single atomic recollection extracted from conversation.
///
/// Fragments are immutable once stored: they are only inserted, queried,
/// or removed wholesale with their scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFragment {
    /// Unique identifier, assigned on insert.
    pub fragment_id: String,
    /// The core memory text. Always non-empty.
    pub content: String,
    /// Which side of the conversation this fragment came from.
    pub speaker: Speaker,
    /// Memory category.
    #[serde(rename = "type")]
    pub kind: FragmentKind,
    /// Emotional tone.
    pub sentiment: Sentiment,
    /// People, places, organizations mentioned.
    pub entities: Vec<String>,
    /// Themes or subjects discussed.
    pub topics: Vec<String>,
    /// Importance rating, an integer in 1..=10.
    pub importance_score: i32,
    /// Model confidence in 0.0..=1.0.
    pub confidence: f64,
    /// When this memory occurred.
    pub timestamp: DateTime<Utc>,
    /// Opaque context (source tag, extraction reasoning).
    pub metadata: BTreeMap<String, String>,
    /// Embedding vector; dimension matches the store's bound adapter.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// A validated fragment produced by the extraction engine, before the
/// store assigns an id and embedding.
#[derive(Debug, Clone)]
pub struct FragmentDraft {
    pub content: String,
    pub speaker: Speaker,
    pub kind: FragmentKind,
    pub sentiment: Sentiment,
    pub entities: Vec<String>,
    pub topics: Vec<String>,
    pub importance_score: i32,
    pub confidence: f64,
    pub metadata: BTreeMap<String, String>,
}

/// Memory category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Event,
    Preference,
    Fact,
    Relationship,
}

impl FragmentKind {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Event => "event",
            FragmentKind::Preference => "preference",
            FragmentKind::Fact => "fact",
            FragmentKind::Relationship => "relationship",
        }
    }

    /// Parse from a stored or LLM-returned string. Unknown values are
    /// `None`; the extractor rejects such fragments.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "event" => Some(FragmentKind::Event),
            "preference" => Some(FragmentKind::Preference),
            "fact" => Some(FragmentKind::Fact),
            "relationship" => Some(FragmentKind::Relationship),
            _ => None,
        }
    }
}

/// Emotional tone of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    /// Parse from a stored or LLM-returned string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

/// A fragment with its hybrid retrieval score.
#[derive(Debug, Clone)]
pub struct ScoredFragment {
    pub fragment: MemoryFragment,
    /// Combined similarity + importance + recency score.
    pub score: f32,
}

/// Optional, AND-combined filters for store queries and listings.
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub min_importance: Option<i32>,
    pub speaker: Option<Speaker>,
    pub kind: Option<FragmentKind>,
}

/// Convert an f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// For L2-normalized vectors (as produced by every embedding adapter),
/// this is equivalent to the dot product. Range [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "vectors must have same length");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity mapped into [0, 1]; the unit used by the store's
/// query contract and the retriever's hybrid score.
pub fn cosine_similarity01(a: &[f32], b: &[f32]) -> f32 {
    ((1.0 + cosine_similarity(a, b)) / 2.0).clamp(0.0, 1.0)
}
