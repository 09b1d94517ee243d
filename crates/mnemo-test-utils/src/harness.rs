// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end test harness: full stack on a tempdir with mock adapters.
//!
//! Wires a real store (deterministic simple embedder), real identity
//! stores, a real extraction worker pool, and scripted reply/scoring
//! adapters. Every harness is isolated; tests are CI-runnable with no
//! network.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mnemo_chat::{ChatOptions, ChatOrchestrator, ChatOutcome, ExtractionScheduler, OrchestratorConfig};
use mnemo_core::types::Scope;
use mnemo_core::MnemoError;
use mnemo_identity::{RoleRegistry, SessionStore, UserStore};
use mnemo_memory::{HybridRetriever, MemoryExtractor, MemoryStore, SimpleEmbedder};

use crate::mock_chat::MockChatAdapter;

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    reply_responses: Vec<String>,
    scoring_responses: Vec<String>,
    scoring_delay: Duration,
    config: OrchestratorConfig,
    default_role_id: String,
}

impl TestHarnessBuilder {
    /// Responses for the user-facing reply adapter, in order.
    pub fn with_reply_responses(mut self, responses: Vec<String>) -> Self {
        self.reply_responses = responses;
        self
    }

    /// Responses for the scoring (extraction) adapter, in order.
    pub fn with_scoring_responses(mut self, responses: Vec<String>) -> Self {
        self.scoring_responses = responses;
        self
    }

    /// Delay every scoring call (for reply-non-blocking tests).
    pub fn with_scoring_delay(mut self, delay: Duration) -> Self {
        self.scoring_delay = delay;
        self
    }

    /// Override orchestrator tunables.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> Result<TestHarness, MnemoError> {
        let dir = tempfile::tempdir().map_err(|e| MnemoError::Storage {
            source: Box::new(e),
        })?;

        let users = Arc::new(UserStore::open(dir.path().join("users")).await?);
        let sessions = Arc::new(SessionStore::open(dir.path().join("sessions")).await?);
        let roles = Arc::new(
            RoleRegistry::load(Path::new("/nonexistent/roles"), &self.default_role_id).await?,
        );
        let store = Arc::new(
            MemoryStore::open(
                &dir.path().join("memory.db"),
                Arc::new(SimpleEmbedder::new()),
            )
            .await?,
        );
        store.verify_dimension().await?;

        let reply = Arc::new(MockChatAdapter::with_responses(self.reply_responses));
        let scoring = Arc::new(
            MockChatAdapter::with_responses(self.scoring_responses)
                .with_delay(self.scoring_delay),
        );
        let extractor = Arc::new(MemoryExtractor::new(scoring.clone(), None, 0.1));
        let scheduler = ExtractionScheduler::spawn(extractor, store.clone(), 2);

        let retriever = Arc::new(HybridRetriever::new(store.clone()));
        let orchestrator = Arc::new(ChatOrchestrator::new(
            users.clone(),
            sessions.clone(),
            roles.clone(),
            retriever.clone(),
            reply.clone(),
            scheduler,
            self.config,
        ));

        Ok(TestHarness {
            orchestrator,
            retriever,
            store,
            users,
            sessions,
            roles,
            reply,
            scoring,
            default_role_id: self.default_role_id,
            _dir: dir,
        })
    }
}

/// A fully wired mnemo stack over a temporary directory.
pub struct TestHarness {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub retriever: Arc<HybridRetriever>,
    pub store: Arc<MemoryStore>,
    pub users: Arc<UserStore>,
    pub sessions: Arc<SessionStore>,
    pub roles: Arc<RoleRegistry>,
    pub reply: Arc<MockChatAdapter>,
    pub scoring: Arc<MockChatAdapter>,
    default_role_id: String,
    _dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder {
            reply_responses: vec![],
            scoring_responses: vec![],
            scoring_delay: Duration::ZERO,
            config: OrchestratorConfig::default(),
            default_role_id: "companion_warm".to_string(),
        }
    }

    /// Send one turn as `user_id` in `session_id`, auto-creating the user.
    pub async fn send_chat(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        extract_now: bool,
    ) -> Result<ChatOutcome, MnemoError> {
        self.orchestrator
            .chat(
                user_id,
                Some(session_id.to_string()),
                None,
                text,
                ChatOptions {
                    extract_now,
                    username: Some(format!("user_{user_id}")),
                    ..Default::default()
                },
            )
            .await
    }

    /// The scope for a (user, session) pair under the default role.
    pub fn scope(&self, user_id: &str, session_id: &str) -> Scope {
        Scope::new(user_id, session_id, self.default_role_id.clone())
    }

    /// Wait until no extraction job is in flight for the scope.
    pub async fn wait_extraction_idle(&self, scope: &Scope) {
        for _ in 0..300 {
            if self.orchestrator.scheduler().is_idle(scope) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("extraction for {scope} did not finish in time");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_builds_and_replies() {
        let harness = TestHarness::builder()
            .with_reply_responses(vec!["你好！".to_string()])
            .build()
            .await
            .unwrap();
        let outcome = harness.send_chat("u1", "s1", "在吗", false).await.unwrap();
        assert_eq!(outcome.reply, "你好！");
        assert_eq!(outcome.message_count, 2);
    }

    #[tokio::test]
    async fn harnesses_are_isolated() {
        let a = TestHarness::builder().build().await.unwrap();
        let b = TestHarness::builder().build().await.unwrap();
        a.send_chat("u1", "s1", "只在A", false).await.unwrap();
        assert!(b.sessions.get("s1").await.is_none());
    }
}
