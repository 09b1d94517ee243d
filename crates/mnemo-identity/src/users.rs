// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flat-JSON user persistence: one `{data_dir}/users/{user_id}.json` per user.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mnemo_core::MnemoError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

/// An identity record. The memory core only ever sees the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn io_err(e: std::io::Error) -> MnemoError {
    MnemoError::Storage {
        source: Box::new(e),
    }
}

/// User store backed by one JSON file per user.
///
/// All users are loaded into memory at open; the process is the sole
/// writer of the directory.
pub struct UserStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, User>>,
}

impl UserStore {
    /// Opens the store, creating the directory and loading existing users.
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
                Ok(content) => match serde_json::from_str::<User>(&content) {
                    Ok(user) => {
                        cache.insert(user.user_id.clone(), user);
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable user file"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable user file"),
            }
        }

        Ok(Self {
            dir,
            cache: RwLock::new(cache),
        })
    }

    /// Create a new user. Generates an id when none is provided.
    pub async fn create(
        &self,
        username: &str,
        user_id: Option<String>,
    ) -> Result<User, MnemoError> {
        let user = User {
            user_id: user_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            username: username.to_string(),
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        };
        self.persist(&user).await?;
        self.cache
            .write()
            .await
            .insert(user.user_id.clone(), user.clone());
        Ok(user)
    }

    /// Look up a user by id.
    pub async fn get(&self, user_id: &str) -> Option<User> {
        self.cache.read().await.get(user_id).cloned()
    }

    /// Get an existing user or create one with the given username.
    pub async fn get_or_create(
        &self,
        username: &str,
        user_id: Option<String>,
    ) -> Result<User, MnemoError> {
        if let Some(id) = &user_id {
            if let Some(user) = self.get(id).await {
                return Ok(user);
            }
        }
        self.create(username, user_id).await
    }

    /// All known users.
    pub async fn list(&self) -> Vec<User> {
        self.cache.read().await.values().cloned().collect()
    }

    async fn persist(&self, user: &User) -> Result<(), MnemoError> {
        let path = self.dir.join(format!("{}.json", user.user_id));
        let json = serde_json::to_string_pretty(user).map_err(|e| MnemoError::Storage {
            source: Box::new(e),
        })?;
        tokio::fs::write(&path, json).await.map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().to_path_buf()).await.unwrap();

        let user = store.create("张三", Some("u1".to_string())).await.unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.username, "张三");

        let fetched = store.get("u1").await.unwrap();
        assert_eq!(fetched.username, "张三");
        assert!(store.get("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn users_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = UserStore::open(dir.path().to_path_buf()).await.unwrap();
            store.create("李四", Some("u2".to_string())).await.unwrap();
        }
        let reopened = UserStore::open(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(reopened.get("u2").await.unwrap().username, "李四");
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().to_path_buf()).await.unwrap();

        let first = store
            .get_or_create("王五", Some("u3".to_string()))
            .await
            .unwrap();
        let second = store
            .get_or_create("另一个名字", Some("u3".to_string()))
            .await
            .unwrap();
        assert_eq!(first.user_id, second.user_id);
        // Existing user wins; the new username is not applied.
        assert_eq!(second.username, "王五");
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn generated_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().to_path_buf()).await.unwrap();
        let a = store.create("a", None).await.unwrap();
        let b = store.create("b", None).await.unwrap();
        assert_ne!(a.user_id, b.user_id);
    }

    #[tokio::test]
    async fn corrupt_files_are_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("broken.json"), "not json")
            .await
            .unwrap();
        let store = UserStore::open(dir.path().to_path_buf()).await.unwrap();
        assert!(store.list().await.is_empty());
    }
}
