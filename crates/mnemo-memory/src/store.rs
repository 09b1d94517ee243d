// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed fragment store with per-scope collections and BLOB vectors.
//!
//! Each scope maps to a logically separate collection named
//! `{user_id}_{session_id}_{role_id}`; every operation filters on the
//! collection, so fragments never cross scopes. A `collections` table
//! records each collection's embedding dimension, which is validated on
//! insert and at startup.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mnemo_core::traits::EmbeddingAdapter;
use mnemo_core::types::{Scope, Speaker};
use mnemo_core::MnemoError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::types::{
    blob_to_vec, cosine_similarity01, vec_to_blob, FragmentDraft, MemoryFragment, QueryFilters,
};

/// Exact-duplicate inserts of the same `(content, speaker)` within this
/// window are skipped, making re-extraction of the same window idempotent.
const DEDUP_WINDOW_SECS: i64 = 600;

/// Helper to convert tokio_rusqlite errors into MnemoError::Storage.
fn storage_err(e: tokio_rusqlite::Error) -> MnemoError {
    MnemoError::Storage {
        source: Box::new(e),
    }
}

/// Persistent, process-wide store for memory fragments.
///
/// The embedding adapter is bound at construction and immutable for the
/// store's lifetime; [`MemoryStore::verify_dimension`] refuses startup
/// when existing collections were built with a different dimension.
pub struct MemoryStore {
    conn: Connection,
    embedder: Arc<dyn EmbeddingAdapter>,
}

impl MemoryStore {
    /// Opens (or creates) the store at the given path.
    pub async fn open(
        path: &Path,
        embedder: Arc<dyn EmbeddingAdapter>,
    ) -> Result<Self, MnemoError> {
        let conn = Connection::open(path).await.map_err(storage_err)?;
        let store = Self { conn, embedder };
        store.init_schema().await?;
        Ok(store)
    }

    /// Opens an in-memory store (tests and ephemeral runs).
    pub async fn open_in_memory(embedder: Arc<dyn EmbeddingAdapter>) -> Result<Self, MnemoError> {
        let conn = Connection::open_in_memory().await.map_err(storage_err)?;
        let store = Self { conn, embedder };
        store.init_schema().await?;
        Ok(store)
    }

    /// The bound embedding adapter.
    pub fn embedder(&self) -> Arc<dyn EmbeddingAdapter> {
        self.embedder.clone()
    }

    /// The bound adapter's output dimension.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    async fn init_schema(&self) -> Result<(), MnemoError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS collections (
                        name TEXT PRIMARY KEY NOT NULL,
                        user_id TEXT NOT NULL,
                        session_id TEXT NOT NULL,
                        role_id TEXT NOT NULL,
                        dimension INTEGER NOT NULL,
                        created_at TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS fragments (
                        id TEXT PRIMARY KEY NOT NULL,
                        collection TEXT NOT NULL,
                        content TEXT NOT NULL,
                        speaker TEXT NOT NULL,
                        kind TEXT NOT NULL,
                        sentiment TEXT NOT NULL,
                        entities TEXT NOT NULL,
                        topics TEXT NOT NULL,
                        importance_score INTEGER NOT NULL,
                        confidence REAL NOT NULL,
                        metadata TEXT NOT NULL,
                        embedding BLOB NOT NULL,
                        created_at TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_fragments_collection
                        ON fragments(collection);
                    CREATE INDEX IF NOT EXISTS idx_fragments_created
                        ON fragments(collection, created_at);",
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Verify that every existing collection matches the bound adapter's
    /// dimension. Called once at startup; a mismatch is a startup refusal.
    pub async fn verify_dimension(&self) -> Result<(), MnemoError> {
        let adapter_dim = self.embedder.dimension();
        let collections: Vec<(String, usize)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT name, dimension FROM collections")?;
                let rows = stmt
                    .query_map([], |row| {
                        let name: String = row.get(0)?;
                        let dim: i64 = row.get(1)?;
                        Ok((name, dim as usize))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)?;

        for (name, stored_dim) in collections {
            if stored_dim != adapter_dim {
                return Err(MnemoError::DimensionMismatch {
                    collection: name,
                    expected: stored_dim,
                    actual: adapter_dim,
                });
            }
        }
        Ok(())
    }

    /// Insert a validated fragment draft under the given scope.
    ///
    /// Computes the embedding via the bound adapter, assigns a fragment id,
    /// and persists both. Returns `Ok(None)` when an identical
    /// `(content, speaker)` fragment was stored within the dedup window.
    pub async fn insert(
        &self,
        scope: &Scope,
        draft: FragmentDraft,
    ) -> Result<Option<MemoryFragment>, MnemoError> {
        if draft.content.trim().is_empty() {
            return Err(MnemoError::Internal(
                "refusing to store fragment with empty content".to_string(),
            ));
        }

        let embedding = self.embedder.embed(&draft.content).await?;
        let collection = scope.collection_name();
        let now = Utc::now();

        if self
            .is_recent_duplicate(&collection, &draft.content, draft.speaker, now)
            .await?
        {
            debug!(collection = %collection, "skipping duplicate fragment");
            return Ok(None);
        }

        self.ensure_collection(scope, embedding.len(), now).await?;

        let fragment = MemoryFragment {
            fragment_id: uuid::Uuid::new_v4().to_string(),
            content: draft.content,
            speaker: draft.speaker,
            kind: draft.kind,
            sentiment: draft.sentiment,
            entities: draft.entities,
            topics: draft.topics,
            importance_score: draft.importance_score,
            confidence: draft.confidence,
            timestamp: now,
            metadata: draft.metadata,
            embedding,
        };

        let row = FragmentRow::from_fragment(&collection, &fragment);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO fragments (id, collection, content, speaker, kind, sentiment,
                        entities, topics, importance_score, confidence, metadata, embedding, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    rusqlite::params![
                        row.id,
                        row.collection,
                        row.content,
                        row.speaker,
                        row.kind,
                        row.sentiment,
                        row.entities,
                        row.topics,
                        row.importance_score,
                        row.confidence,
                        row.metadata,
                        row.embedding,
                        row.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;

        Ok(Some(fragment))
    }

    /// Nearest-neighbor query over a scope's fragments.
    ///
    /// Returns `(fragment, similarity)` pairs with similarity in [0, 1],
    /// sorted descending, at most `top_k` entries.
    pub async fn query(
        &self,
        scope: &Scope,
        query_text: &str,
        top_k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<(MemoryFragment, f32)>, MnemoError> {
        if top_k == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(query_text).await?;
        let candidates = self.load_fragments(scope, filters, None).await?;

        let mut scored: Vec<(MemoryFragment, f32)> = candidates
            .into_iter()
            .filter(|f| f.embedding.len() == query_embedding.len())
            .map(|f| {
                let similarity = cosine_similarity01(&query_embedding, &f.embedding);
                (f, similarity)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Number of fragments stored under the scope.
    pub async fn count(&self, scope: &Scope) -> Result<usize, MnemoError> {
        let collection = scope.collection_name();
        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM fragments WHERE collection = ?1",
                    rusqlite::params![collection],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(storage_err)
    }

    /// List fragments under the scope, newest first.
    pub async fn list(
        &self,
        scope: &Scope,
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<MemoryFragment>, MnemoError> {
        self.load_fragments(scope, filters, Some(limit)).await
    }

    /// List fragments across a user's scopes, optionally narrowed to one
    /// session and/or role. Ordered by importance descending, newest first
    /// within equal importance. Serves the memory listing API.
    pub async fn list_matching(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        role_id: Option<&str>,
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<MemoryFragment>, MnemoError> {
        let user_id = user_id.to_string();
        let session_id = session_id.map(str::to_string);
        let role_id = role_id.map(str::to_string);
        let filters = filters.clone();
        self.conn
            .call(move |conn| {
                let mut sql = String::from(
                    "SELECT f.id, f.content, f.speaker, f.kind, f.sentiment, f.entities,
                            f.topics, f.importance_score, f.confidence, f.metadata,
                            f.embedding, f.created_at
                     FROM fragments f
                     JOIN collections c ON f.collection = c.name
                     WHERE c.user_id = ?1",
                );
                let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(user_id)];

                if let Some(session_id) = session_id {
                    values.push(Box::new(session_id));
                    sql.push_str(&format!(" AND c.session_id = ?{}", values.len()));
                }
                if let Some(role_id) = role_id {
                    values.push(Box::new(role_id));
                    sql.push_str(&format!(" AND c.role_id = ?{}", values.len()));
                }
                if let Some(min_importance) = filters.min_importance {
                    values.push(Box::new(min_importance));
                    sql.push_str(&format!(" AND f.importance_score >= ?{}", values.len()));
                }
                if let Some(speaker) = filters.speaker {
                    values.push(Box::new(speaker.as_str().to_string()));
                    sql.push_str(&format!(" AND f.speaker = ?{}", values.len()));
                }
                if let Some(kind) = filters.kind {
                    values.push(Box::new(kind.as_str().to_string()));
                    sql.push_str(&format!(" AND f.kind = ?{}", values.len()));
                }

                sql.push_str(" ORDER BY f.importance_score DESC, f.created_at DESC");
                values.push(Box::new(limit as i64));
                sql.push_str(&format!(" LIMIT ?{}", values.len()));

                let mut stmt = conn.prepare(&sql)?;
                let params: Vec<&dyn rusqlite::types::ToSql> =
                    values.iter().map(|v| v.as_ref()).collect();
                let fragments = stmt
                    .query_map(params.as_slice(), row_to_fragment)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(fragments)
            })
            .await
            .map_err(storage_err)
    }

    /// Remove all fragments under the scope.
    pub async fn delete_scope(&self, scope: &Scope) -> Result<(), MnemoError> {
        let collection = scope.collection_name();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM fragments WHERE collection = ?1",
                    rusqlite::params![collection],
                )?;
                tx.execute(
                    "DELETE FROM collections WHERE name = ?1",
                    rusqlite::params![collection],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Register the collection on first insert; enforce dimension afterwards.
    async fn ensure_collection(
        &self,
        scope: &Scope,
        dimension: usize,
        now: DateTime<Utc>,
    ) -> Result<(), MnemoError> {
        let collection = scope.collection_name();
        let existing: Option<usize> = {
            let name = collection.clone();
            self.conn
                .call(move |conn| {
                    let dim = conn
                        .query_row(
                            "SELECT dimension FROM collections WHERE name = ?1",
                            rusqlite::params![name],
                            |row| row.get::<_, i64>(0),
                        )
                        .optional()?;
                    Ok(dim.map(|d| d as usize))
                })
                .await
                .map_err(storage_err)?
        };

        match existing {
            Some(expected) if expected != dimension => Err(MnemoError::DimensionMismatch {
                collection,
                expected,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                let scope = scope.clone();
                let created_at = format_ts(now);
                self.conn
                    .call(move |conn| {
                        conn.execute(
                            "INSERT OR IGNORE INTO collections
                                (name, user_id, session_id, role_id, dimension, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                            rusqlite::params![
                                scope.collection_name(),
                                scope.user_id,
                                scope.session_id,
                                scope.role_id,
                                dimension as i64,
                                created_at,
                            ],
                        )?;
                        Ok(())
                    })
                    .await
                    .map_err(storage_err)
            }
        }
    }

    async fn is_recent_duplicate(
        &self,
        collection: &str,
        content: &str,
        speaker: Speaker,
        now: DateTime<Utc>,
    ) -> Result<bool, MnemoError> {
        let collection = collection.to_string();
        let content = content.to_string();
        let speaker = speaker.as_str().to_string();
        let cutoff = format_ts(now - Duration::seconds(DEDUP_WINDOW_SECS));
        self.conn
            .call(move |conn| {
                let exists = conn
                    .query_row(
                        "SELECT 1 FROM fragments
                         WHERE collection = ?1 AND content = ?2 AND speaker = ?3
                           AND created_at >= ?4
                         LIMIT 1",
                        rusqlite::params![collection, content, speaker, cutoff],
                        |_| Ok(()),
                    )
                    .optional()?;
                Ok(exists.is_some())
            })
            .await
            .map_err(storage_err)
    }

    /// Load fragments for a scope with optional filters, newest first.
    async fn load_fragments(
        &self,
        scope: &Scope,
        filters: &QueryFilters,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryFragment>, MnemoError> {
        let collection = scope.collection_name();
        let filters = filters.clone();
        self.conn
            .call(move |conn| {
                let mut sql = String::from(
                    "SELECT id, content, speaker, kind, sentiment, entities, topics,
                            importance_score, confidence, metadata, embedding, created_at
                     FROM fragments WHERE collection = ?1",
                );
                let mut values: Vec<Box<dyn rusqlite::types::ToSql>> =
                    vec![Box::new(collection)];

                if let Some(min_importance) = filters.min_importance {
                    values.push(Box::new(min_importance));
                    sql.push_str(&format!(" AND importance_score >= ?{}", values.len()));
                }
                if let Some(speaker) = filters.speaker {
                    values.push(Box::new(speaker.as_str().to_string()));
                    sql.push_str(&format!(" AND speaker = ?{}", values.len()));
                }
                if let Some(kind) = filters.kind {
                    values.push(Box::new(kind.as_str().to_string()));
                    sql.push_str(&format!(" AND kind = ?{}", values.len()));
                }

                sql.push_str(" ORDER BY created_at DESC");
                if let Some(limit) = limit {
                    values.push(Box::new(limit as i64));
                    sql.push_str(&format!(" LIMIT ?{}", values.len()));
                }

                let mut stmt = conn.prepare(&sql)?;
                let params: Vec<&dyn rusqlite::types::ToSql> =
                    values.iter().map(|v| v.as_ref()).collect();
                let fragments = stmt
                    .query_map(params.as_slice(), row_to_fragment)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(fragments)
            })
            .await
            .map_err(storage_err)
    }
}

/// Owned column values for an insert, prepared outside the call closure.
struct FragmentRow {
    id: String,
    collection: String,
    content: String,
    speaker: String,
    kind: String,
    sentiment: String,
    entities: String,
    topics: String,
    importance_score: i32,
    confidence: f64,
    metadata: String,
    embedding: Vec<u8>,
    created_at: String,
}

impl FragmentRow {
    fn from_fragment(collection: &str, fragment: &MemoryFragment) -> Self {
        Self {
            id: fragment.fragment_id.clone(),
            collection: collection.to_string(),
            content: fragment.content.clone(),
            speaker: fragment.speaker.as_str().to_string(),
            kind: fragment.kind.as_str().to_string(),
            sentiment: fragment.sentiment.as_str().to_string(),
            entities: serde_json::to_string(&fragment.entities).unwrap_or_else(|_| "[]".into()),
            topics: serde_json::to_string(&fragment.topics).unwrap_or_else(|_| "[]".into()),
            importance_score: fragment.importance_score,
            confidence: fragment.confidence,
            metadata: serde_json::to_string(&fragment.metadata).unwrap_or_else(|_| "{}".into()),
            embedding: vec_to_blob(&fragment.embedding),
            created_at: format_ts(fragment.timestamp),
        }
    }
}

/// Convert a rusqlite row into a MemoryFragment.
fn row_to_fragment(row: &rusqlite::Row) -> Result<MemoryFragment, rusqlite::Error> {
    let speaker_str: String = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let sentiment_str: String = row.get(4)?;
    let entities_json: String = row.get(5)?;
    let topics_json: String = row.get(6)?;
    let metadata_json: String = row.get(9)?;
    let embedding_blob: Vec<u8> = row.get(10)?;
    let created_at: String = row.get(11)?;

    Ok(MemoryFragment {
        fragment_id: row.get(0)?,
        content: row.get(1)?,
        // Stored values were validated on insert; fall back rather than fail the row.
        speaker: Speaker::parse(&speaker_str).unwrap_or(Speaker::User),
        kind: crate::types::FragmentKind::parse(&kind_str)
            .unwrap_or(crate::types::FragmentKind::Fact),
        sentiment: crate::types::Sentiment::parse(&sentiment_str)
            .unwrap_or(crate::types::Sentiment::Neutral),
        entities: serde_json::from_str(&entities_json).unwrap_or_default(),
        topics: serde_json::from_str(&topics_json).unwrap_or_default(),
        importance_score: row.get(7)?,
        confidence: row.get(8)?,
        metadata: serde_json::from_str::<BTreeMap<String, String>>(&metadata_json)
            .unwrap_or_default(),
        embedding: blob_to_vec(&embedding_blob),
        timestamp: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Timestamps are stored in a fixed RFC 3339 format so lexicographic
/// comparison in SQL matches chronological order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Extension trait for optional row queries.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
