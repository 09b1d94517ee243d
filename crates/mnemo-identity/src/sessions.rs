// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flat-JSON session persistence with durable message history.
//!
//! One `{data_dir}/sessions/{session_id}.json` per session. The session
//! record is the durable history used for replay; the orchestrator's
//! in-memory buffer is separate and authoritative only for extraction
//! windowing.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mnemo_core::types::ChatMessage;
use mnemo_core::MnemoError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

/// A conversation container owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Durable message history, oldest first.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

fn io_err(e: std::io::Error) -> MnemoError {
    MnemoError::Storage {
        source: Box::new(e),
    }
}

/// Session store backed by one JSON file per session.
pub struct SessionStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Opens the store, creating the directory and loading existing sessions.
    pub async fn open(dir: PathBuf) -> Result<Self, MnemoError> {
        tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;

        let mut cache = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<Session>(&content) {
                    Ok(session) => {
                        cache.insert(session.session_id.clone(), session);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable session file")
                    }
                },
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable session file"),
            }
        }

        Ok(Self {
            dir,
            cache: RwLock::new(cache),
        })
    }

    /// Create a new session for a user.
    pub async fn create(
        &self,
        user_id: &str,
        title: &str,
        session_id: Option<String>,
    ) -> Result<Session, MnemoError> {
        let now = Utc::now();
        let session = Session {
            session_id: session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_id: user_id.to_string(),
            title: title.to_string(),
            message_count: 0,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        self.persist(&session).await?;
        self.cache
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    /// Look up a session by id.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.cache.read().await.get(session_id).cloned()
    }

    /// Append one message to the durable history.
    pub async fn append_message(
        &self,
        session_id: &str,
        message: ChatMessage,
    ) -> Result<Session, MnemoError> {
        let updated = {
            let mut cache = self.cache.write().await;
            let session = cache
                .get_mut(session_id)
                .ok_or_else(|| MnemoError::UnknownSession(session_id.to_string()))?;
            session.messages.push(message);
            session.message_count = session.messages.len();
            session.updated_at = Utc::now();
            session.clone()
        };
        self.persist(&updated).await?;
        Ok(updated)
    }

    /// All sessions belonging to one user.
    pub async fn list_for_user(&self, user_id: &str) -> Vec<Session> {
        self.cache
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn persist(&self, session: &Session) -> Result<(), MnemoError> {
        let path = self.dir.join(format!("{}.json", session.session_id));
        let json = serde_json::to_string_pretty(session).map_err(|e| MnemoError::Storage {
            source: Box::new(e),
        })?;
        tokio::fs::write(&path, json).await.map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::types::Speaker;

    fn message(session_id: &str, role: Speaker, content: &str) -> ChatMessage {
        ChatMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_get_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().to_path_buf()).await.unwrap();

        let session = store
            .create("u1", "新对话", Some("s1".to_string()))
            .await
            .unwrap();
        assert_eq!(session.message_count, 0);

        store
            .append_message("s1", message("s1", Speaker::User, "你好"))
            .await
            .unwrap();
        let updated = store
            .append_message("s1", message("s1", Speaker::Assistant, "你好呀"))
            .await
            .unwrap();

        assert_eq!(updated.message_count, 2);
        assert_eq!(updated.messages[0].content, "你好");
        assert_eq!(updated.messages[1].role, Speaker::Assistant);
    }

    #[tokio::test]
    async fn append_to_unknown_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().to_path_buf()).await.unwrap();
        let err = store
            .append_message("missing", message("missing", Speaker::User, "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, MnemoError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionStore::open(dir.path().to_path_buf()).await.unwrap();
            store
                .create("u1", "持久会话", Some("s2".to_string()))
                .await
                .unwrap();
            store
                .append_message("s2", message("s2", Speaker::User, "记住这句话"))
                .await
                .unwrap();
        }
        let reopened = SessionStore::open(dir.path().to_path_buf()).await.unwrap();
        let session = reopened.get("s2").await.unwrap();
        assert_eq!(session.message_count, 1);
        assert_eq!(session.messages[0].content, "记住这句话");
    }

    #[tokio::test]
    async fn list_for_user_filters_by_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().to_path_buf()).await.unwrap();
        store.create("u1", "a", None).await.unwrap();
        store.create("u1", "b", None).await.unwrap();
        store.create("u2", "c", None).await.unwrap();

        assert_eq!(store.list_for_user("u1").await.len(), 2);
        assert_eq!(store.list_for_user("u2").await.len(), 1);
        assert!(store.list_for_user("u3").await.is_empty());
    }
}
