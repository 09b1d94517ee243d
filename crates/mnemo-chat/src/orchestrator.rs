// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-turn pipeline: buffer, retrieve, prompt, reply, schedule extraction.
//!
//! Turns for the same session are serialized by a per-session mutex so the
//! message buffer and turn counter stay consistent; distinct sessions run
//! fully in parallel. The reply is produced synchronously; extraction is
//! scheduled onto the worker pool and never delays the reply.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use mnemo_core::traits::ChatAdapter;
use mnemo_core::types::{ChatMessage, CompletionRequest, Scope, Speaker};
use mnemo_core::MnemoError;
use mnemo_identity::{RoleRegistry, SessionStore, UserStore};
use mnemo_memory::{HybridRetriever, RetrievalConfig, ScoredFragment};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::prompt;
use crate::worker::ExtractionScheduler;

/// Session states untouched for this long are evicted from the map.
const IDLE_EVICT_AFTER: Duration = Duration::from_secs(30 * 60);

/// Per-call options for [`ChatOrchestrator::chat`].
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Force extraction this turn regardless of the counter.
    pub extract_now: bool,
    /// Auto-create the user with this name if absent.
    pub username: Option<String>,
    pub min_importance_override: Option<i32>,
    pub max_context_memories_override: Option<usize>,
}

/// Result of one turn.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: String,
    pub user_id: String,
    pub session_id: String,
    /// Whether an extraction job was scheduled on this turn.
    pub memory_extracted: bool,
    /// Durable message count of the session after this turn.
    pub message_count: usize,
    /// Fragments injected into the prompt.
    pub fragments_used: usize,
}

/// Tunables owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// User turns between automatic extractions.
    pub extract_threshold: u64,
    /// Cap on fragments injected into the prompt.
    pub max_context_memories: usize,
    /// Soft cap on the in-memory buffer; oldest messages evicted beyond it.
    pub buffer_cap: usize,
    pub reply_temperature: f32,
    pub reply_max_tokens: u32,
    /// Process-default retrieval parameters.
    pub retrieval: RetrievalConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            extract_threshold: 5,
            max_context_memories: 5,
            buffer_cap: 50,
            reply_temperature: 0.8,
            reply_max_tokens: 1024,
            retrieval: RetrievalConfig::default(),
        }
    }
}

/// Mutable per-session state, guarded by a per-session mutex.
struct SessionState {
    buffer: VecDeque<ChatMessage>,
    turn_count: u64,
    last_used: Instant,
}

impl SessionState {
    fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
            turn_count: 0,
            last_used: Instant::now(),
        }
    }
}

/// The turn orchestrator.
pub struct ChatOrchestrator {
    users: Arc<UserStore>,
    sessions: Arc<SessionStore>,
    roles: Arc<RoleRegistry>,
    retriever: Arc<HybridRetriever>,
    chat: Arc<dyn ChatAdapter>,
    scheduler: ExtractionScheduler,
    config: OrchestratorConfig,
    session_states: DashMap<String, Arc<Mutex<SessionState>>>,
}

impl ChatOrchestrator {
    pub fn new(
        users: Arc<UserStore>,
        sessions: Arc<SessionStore>,
        roles: Arc<RoleRegistry>,
        retriever: Arc<HybridRetriever>,
        chat: Arc<dyn ChatAdapter>,
        scheduler: ExtractionScheduler,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            users,
            sessions,
            roles,
            retriever,
            chat,
            scheduler,
            config,
            session_states: DashMap::new(),
        }
    }

    /// Handle one user turn.
    pub async fn chat(
        &self,
        user_id: &str,
        session_id: Option<String>,
        role_id: Option<String>,
        user_text: &str,
        options: ChatOptions,
    ) -> Result<ChatOutcome, MnemoError> {
        self.evict_idle_sessions();

        // 1. Resolve role, user, session.
        let role = match &role_id {
            Some(id) => self
                .roles
                .get(id)
                .ok_or_else(|| MnemoError::InvalidRole(id.clone()))?,
            None => self.roles.default_role(),
        };

        let user = match &options.username {
            Some(username) => {
                self.users
                    .get_or_create(username, Some(user_id.to_string()))
                    .await?
            }
            None => self
                .users
                .get(user_id)
                .await
                .ok_or_else(|| MnemoError::UnknownUser(user_id.to_string()))?,
        };

        let session = match session_id {
            Some(id) => match self.sessions.get(&id).await {
                Some(session) => {
                    if session.user_id != user.user_id {
                        return Err(MnemoError::UnknownSession(id));
                    }
                    session
                }
                None => self.sessions.create(&user.user_id, "新对话", Some(id)).await?,
            },
            None => self.sessions.create(&user.user_id, "新对话", None).await?,
        };

        let scope = Scope::new(
            user.user_id.clone(),
            session.session_id.clone(),
            role.role_id.clone(),
        );

        // 2. Serialize the rest of the turn per session.
        let state = {
            let entry = self
                .session_states
                .entry(session.session_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(SessionState::new())));
            entry.value().clone()
        };
        let mut state = state.lock().await;
        state.last_used = Instant::now();

        // 3. Buffer + persist the user message.
        let user_message = new_message(&session.session_id, Speaker::User, user_text);
        push_bounded(&mut state.buffer, user_message.clone(), self.config.buffer_cap);
        self.sessions
            .append_message(&session.session_id, user_message)
            .await?;

        // 4. Retrieve context. Query failures degrade to an empty context.
        let retrieval = self.effective_retrieval(&options);
        let memories: Vec<ScoredFragment> = match self
            .retriever
            .select(&scope, user_text, &retrieval)
            .await
        {
            Ok(memories) => memories,
            Err(e) => {
                warn!(scope = %scope, error = %e, "memory retrieval failed, replying without context");
                vec![]
            }
        };
        let fragments_used = memories.len();

        // 5-6. Assemble the prompt and produce the reply synchronously.
        let history: Vec<ChatMessage> = state
            .buffer
            .iter()
            .take(state.buffer.len().saturating_sub(1))
            .cloned()
            .collect();
        let turns = prompt::build_turns(role, &memories, &history, user_text);
        let response = self
            .chat
            .complete(CompletionRequest {
                model: None,
                messages: turns,
                temperature: self.config.reply_temperature,
                max_tokens: self.config.reply_max_tokens,
            })
            .await?;
        let reply = response.content;

        // 7. Buffer + persist the assistant message; advance the counter.
        let assistant_message = new_message(&session.session_id, Speaker::Assistant, &reply);
        push_bounded(
            &mut state.buffer,
            assistant_message.clone(),
            self.config.buffer_cap,
        );
        let session = self
            .sessions
            .append_message(&session.session_id, assistant_message)
            .await?;
        state.turn_count += 1;

        // 8. Schedule extraction without blocking the reply.
        let triggered =
            options.extract_now || state.turn_count % self.config.extract_threshold == 0;
        let memory_extracted = if triggered {
            let window_len = (self.config.extract_threshold as usize * 2).max(2);
            let start = state.buffer.len().saturating_sub(window_len);
            let window: Vec<ChatMessage> =
                state.buffer.iter().skip(start).cloned().collect();
            self.scheduler.schedule(scope.clone(), window)
        } else {
            false
        };
        debug!(
            scope = %scope,
            turn = state.turn_count,
            memory_extracted,
            fragments_used,
            "turn complete"
        );

        Ok(ChatOutcome {
            reply,
            user_id: user.user_id,
            session_id: session.session_id,
            memory_extracted,
            message_count: session.message_count,
            fragments_used,
        })
    }

    /// The extraction scheduler handle (exposed for draining in tests and
    /// the shutdown path).
    pub fn scheduler(&self) -> &ExtractionScheduler {
        &self.scheduler
    }

    fn effective_retrieval(&self, options: &ChatOptions) -> RetrievalConfig {
        let mut retrieval = self.config.retrieval.clone();
        retrieval.top_k = options
            .max_context_memories_override
            .unwrap_or(self.config.max_context_memories);
        if let Some(min_importance) = options.min_importance_override {
            retrieval.min_importance = min_importance;
        }
        retrieval
    }

    fn evict_idle_sessions(&self) {
        self.session_states.retain(|_, state| match state.try_lock() {
            Ok(guard) => guard.last_used.elapsed() < IDLE_EVICT_AFTER,
            // A held lock means the session is mid-turn.
            Err(_) => true,
        });
    }
}

fn new_message(session_id: &str, role: Speaker, content: &str) -> ChatMessage {
    ChatMessage {
        message_id: uuid::Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        role,
        content: content.to_string(),
        timestamp: Utc::now(),
    }
}

fn push_bounded(buffer: &mut VecDeque<ChatMessage>, message: ChatMessage, cap: usize) {
    buffer.push_back(message);
    while buffer.len() > cap {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemo_core::types::CompletionResponse;
    use mnemo_memory::{MemoryExtractor, MemoryStore, SimpleEmbedder};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted reply adapter; returns canned responses in order and
    /// counts calls.
    struct ScriptedChat {
        responses: std::sync::Mutex<VecDeque<String>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedChat {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: std::sync::Mutex::new(
                    responses.into_iter().map(String::from).collect(),
                ),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl ChatAdapter for ScriptedChat {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, MnemoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let content = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "好的".to_string());
            Ok(CompletionResponse {
                content,
                model: "scripted".to_string(),
                usage: None,
            })
        }
    }

    struct Fixture {
        orchestrator: ChatOrchestrator,
        store: Arc<MemoryStore>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(
        reply: Arc<dyn ChatAdapter>,
        scoring: Arc<dyn ChatAdapter>,
        config: OrchestratorConfig,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let users = Arc::new(
            UserStore::open(dir.path().join("users")).await.unwrap(),
        );
        let sessions = Arc::new(
            SessionStore::open(dir.path().join("sessions")).await.unwrap(),
        );
        let roles = Arc::new(
            RoleRegistry::load(Path::new("/nonexistent"), "companion_warm")
                .await
                .unwrap(),
        );
        let store = Arc::new(
            MemoryStore::open_in_memory(Arc::new(SimpleEmbedder::new()))
                .await
                .unwrap(),
        );
        let retriever = Arc::new(HybridRetriever::new(store.clone()));
        let extractor = Arc::new(MemoryExtractor::new(scoring, None, 0.1));
        let scheduler = ExtractionScheduler::spawn(extractor, store.clone(), 2);
        let orchestrator = ChatOrchestrator::new(
            users, sessions, roles, retriever, reply, scheduler, config,
        );
        Fixture {
            orchestrator,
            store,
            _dir: dir,
        }
    }

    fn opts_with_user() -> ChatOptions {
        ChatOptions {
            username: Some("张三".to_string()),
            ..Default::default()
        }
    }

    async fn wait_scope_idle(orchestrator: &ChatOrchestrator, scope: &Scope) {
        for _ in 0..200 {
            if orchestrator.scheduler().is_idle(scope) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("extraction did not finish in time");
    }

    #[tokio::test]
    async fn chat_returns_reply_and_creates_session() {
        let f = fixture(
            Arc::new(ScriptedChat::new(vec!["你好呀！"])),
            Arc::new(ScriptedChat::new(vec![r#"{"fragments": []}"#])),
            OrchestratorConfig::default(),
        )
        .await;

        let outcome = f
            .orchestrator
            .chat("u1", None, None, "你好", opts_with_user())
            .await
            .unwrap();
        assert_eq!(outcome.reply, "你好呀！");
        assert!(!outcome.session_id.is_empty());
        assert_eq!(outcome.message_count, 2);
        assert_eq!(outcome.fragments_used, 0);
    }

    #[tokio::test]
    async fn unknown_user_without_username_is_rejected() {
        let f = fixture(
            Arc::new(ScriptedChat::new(vec![])),
            Arc::new(ScriptedChat::new(vec![])),
            OrchestratorConfig::default(),
        )
        .await;
        let err = f
            .orchestrator
            .chat("ghost", None, None, "你好", ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MnemoError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let f = fixture(
            Arc::new(ScriptedChat::new(vec![])),
            Arc::new(ScriptedChat::new(vec![])),
            OrchestratorConfig::default(),
        )
        .await;
        let err = f
            .orchestrator
            .chat(
                "u1",
                None,
                Some("no_such_role".to_string()),
                "你好",
                opts_with_user(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MnemoError::InvalidRole(_)));
    }

    #[tokio::test]
    async fn extract_now_schedules_and_stores_fragments() {
        let scoring_response = r#"{"fragments": [
            {"content": "我叫张三，是一名软件工程师", "speaker": "user", "type": "fact",
             "sentiment": "neutral", "importance_score": 6, "reasoning": "身份信息"}
        ]}"#;
        let f = fixture(
            Arc::new(ScriptedChat::new(vec!["很高兴认识你！"])),
            Arc::new(ScriptedChat::new(vec![scoring_response])),
            OrchestratorConfig::default(),
        )
        .await;

        let outcome = f
            .orchestrator
            .chat(
                "u1",
                Some("s1".to_string()),
                None,
                "我叫张三，是一名软件工程师",
                ChatOptions {
                    extract_now: true,
                    ..opts_with_user()
                },
            )
            .await
            .unwrap();
        assert!(outcome.memory_extracted);

        let scope = Scope::new("u1", "s1", "companion_warm");
        wait_scope_idle(&f.orchestrator, &scope).await;
        assert_eq!(f.store.count(&scope).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn threshold_triggers_extraction_automatically() {
        let config = OrchestratorConfig {
            extract_threshold: 2,
            ..Default::default()
        };
        let f = fixture(
            Arc::new(ScriptedChat::new(vec!["回复一", "回复二"])),
            Arc::new(ScriptedChat::new(vec![r#"{"fragments": []}"#])),
            config,
        )
        .await;

        let first = f
            .orchestrator
            .chat("u1", Some("s1".to_string()), None, "第一轮", opts_with_user())
            .await
            .unwrap();
        assert!(!first.memory_extracted);

        let second = f
            .orchestrator
            .chat("u1", Some("s1".to_string()), None, "第二轮", opts_with_user())
            .await
            .unwrap();
        assert!(second.memory_extracted, "threshold turn should schedule extraction");
    }

    #[tokio::test]
    async fn reply_is_not_delayed_by_slow_extraction() {
        // Scoring adapter sleeps 500ms per call; the reply adapter is
        // instant. A triggering turn must still return promptly.
        let f = fixture(
            Arc::new(ScriptedChat::new(vec!["即时回复"])),
            Arc::new(
                ScriptedChat::new(vec![r#"{"fragments": []}"#])
                    .with_delay(Duration::from_millis(500)),
            ),
            OrchestratorConfig::default(),
        )
        .await;

        let started = Instant::now();
        let outcome = f
            .orchestrator
            .chat(
                "u1",
                Some("s1".to_string()),
                None,
                "触发提取的一轮",
                ChatOptions {
                    extract_now: true,
                    ..opts_with_user()
                },
            )
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(outcome.memory_extracted);
        assert!(
            elapsed < Duration::from_millis(300),
            "reply blocked on extraction: {elapsed:?}"
        );

        let scope = Scope::new("u1", "s1", "companion_warm");
        wait_scope_idle(&f.orchestrator, &scope).await;
    }

    #[tokio::test]
    async fn retrieved_memories_are_counted_and_injected() {
        let f = fixture(
            Arc::new(ScriptedChat::new(vec!["你最喜欢吃麻辣火锅呀"])),
            Arc::new(ScriptedChat::new(vec![])),
            OrchestratorConfig::default(),
        )
        .await;

        // Seed a stored fragment directly.
        let scope = Scope::new("u1", "s1", "companion_warm");
        f.store
            .insert(
                &scope,
                mnemo_memory::FragmentDraft {
                    content: "用户最喜欢吃麻辣火锅".to_string(),
                    speaker: Speaker::User,
                    kind: mnemo_memory::FragmentKind::Preference,
                    sentiment: mnemo_memory::Sentiment::Positive,
                    entities: vec![],
                    topics: vec![],
                    importance_score: 8,
                    confidence: 0.8,
                    metadata: Default::default(),
                },
            )
            .await
            .unwrap();

        let outcome = f
            .orchestrator
            .chat(
                "u1",
                Some("s1".to_string()),
                None,
                "你知道我喜欢吃什么吗？",
                opts_with_user(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.fragments_used, 1);
        assert!(outcome.reply.contains("火锅"));
    }

    #[tokio::test]
    async fn role_switch_partitions_memory() {
        let scoring_response = r#"{"fragments": [
            {"content": "我叫张三，是一名软件工程师", "speaker": "user", "type": "fact",
             "sentiment": "neutral", "importance_score": 7}
        ]}"#;
        let dir = tempfile::tempdir().unwrap();
        let roles_dir = dir.path().join("roles");
        tokio::fs::create_dir_all(&roles_dir).await.unwrap();
        tokio::fs::write(
            roles_dir.join("analyst.json"),
            serde_json::json!({
                "role_id": "analyst",
                "name": "析言",
                "core_identity": "分析型助手"
            })
            .to_string(),
        )
        .await
        .unwrap();

        let users = Arc::new(UserStore::open(dir.path().join("users")).await.unwrap());
        let sessions = Arc::new(
            SessionStore::open(dir.path().join("sessions")).await.unwrap(),
        );
        let roles = Arc::new(
            RoleRegistry::load(&roles_dir, "companion_warm").await.unwrap(),
        );
        let store = Arc::new(
            MemoryStore::open_in_memory(Arc::new(SimpleEmbedder::new()))
                .await
                .unwrap(),
        );
        let retriever = Arc::new(HybridRetriever::new(store.clone()));
        let extractor = Arc::new(MemoryExtractor::new(
            Arc::new(ScriptedChat::new(vec![scoring_response, scoring_response])),
            None,
            0.1,
        ));
        let scheduler = ExtractionScheduler::spawn(extractor, store.clone(), 2);
        let orchestrator = ChatOrchestrator::new(
            users,
            sessions,
            roles,
            retriever,
            Arc::new(ScriptedChat::new(vec!["回复一", "回复二"])),
            scheduler,
            OrchestratorConfig::default(),
        );

        let opts = || ChatOptions {
            extract_now: true,
            username: Some("张三".to_string()),
            ..Default::default()
        };
        orchestrator
            .chat("u1", Some("s1".to_string()), None, "我叫张三，是一名软件工程师", opts())
            .await
            .unwrap();
        let warm_scope = Scope::new("u1", "s1", "companion_warm");
        for _ in 0..200 {
            if orchestrator.scheduler().is_idle(&warm_scope) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        orchestrator
            .chat(
                "u1",
                Some("s1".to_string()),
                Some("analyst".to_string()),
                "我叫张三，是一名软件工程师",
                opts(),
            )
            .await
            .unwrap();
        let analyst_scope = Scope::new("u1", "s1", "analyst");
        for _ in 0..200 {
            if orchestrator.scheduler().is_idle(&analyst_scope) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Each role sees only its own partition.
        assert_eq!(store.count(&warm_scope).await.unwrap(), 1);
        assert_eq!(store.count(&analyst_scope).await.unwrap(), 1);
        let retriever = HybridRetriever::new(store.clone());
        let from_analyst = retriever
            .select(&analyst_scope, "软件工程师", &RetrievalConfig::default())
            .await
            .unwrap();
        assert_eq!(from_analyst.len(), 1);
    }

    #[tokio::test]
    async fn session_owned_by_other_user_is_rejected() {
        let f = fixture(
            Arc::new(ScriptedChat::new(vec!["ok"])),
            Arc::new(ScriptedChat::new(vec![])),
            OrchestratorConfig::default(),
        )
        .await;

        f.orchestrator
            .chat("u1", Some("shared".to_string()), None, "你好", opts_with_user())
            .await
            .unwrap();

        let err = f
            .orchestrator
            .chat(
                "u2",
                Some("shared".to_string()),
                None,
                "你好",
                ChatOptions {
                    username: Some("李四".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MnemoError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn buffer_is_bounded() {
        let config = OrchestratorConfig {
            buffer_cap: 4,
            extract_threshold: 100,
            ..Default::default()
        };
        let f = fixture(
            Arc::new(ScriptedChat::new(vec![])),
            Arc::new(ScriptedChat::new(vec![])),
            config,
        )
        .await;

        for i in 0..5 {
            f.orchestrator
                .chat(
                    "u1",
                    Some("s1".to_string()),
                    None,
                    &format!("第{i}句"),
                    opts_with_user(),
                )
                .await
                .unwrap();
        }

        let state = f.orchestrator.session_states.get("s1").unwrap().clone();
        let guard = state.lock().await;
        assert!(guard.buffer.len() <= 4);
        assert_eq!(guard.turn_count, 5);
    }
}
