// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background extraction worker pool.
//!
//! Request handlers enqueue [`ExtractionJob`]s and return immediately;
//! a bounded set of workers drains the queue and writes surviving
//! fragments to the store. Per scope, at most one job is in flight:
//! triggers that arrive while a job is scheduled or running coalesce,
//! and the next trigger after completion re-windows.

use std::sync::Arc;

use dashmap::DashMap;
use mnemo_core::types::{ChatMessage, Scope};
use mnemo_memory::{MemoryExtractor, MemoryStore};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Queue capacity; an overflowing queue drops the trigger (the next
/// threshold crossing re-covers the window).
const QUEUE_CAP: usize = 64;

/// One scheduled extraction: the scope plus the message window snapshot
/// taken at schedule time. Later turns do not alter the job's input.
#[derive(Debug)]
pub struct ExtractionJob {
    pub scope: Scope,
    pub window: Vec<ChatMessage>,
}

/// Per-scope job state for coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Scheduled,
    Running,
}

/// Handle for scheduling extraction jobs onto the worker pool.
#[derive(Clone)]
pub struct ExtractionScheduler {
    tx: mpsc::Sender<ExtractionJob>,
    states: Arc<DashMap<String, JobState>>,
}

impl ExtractionScheduler {
    /// Spawn `workers` background tasks consuming the job queue.
    pub fn spawn(
        extractor: Arc<MemoryExtractor>,
        store: Arc<MemoryStore>,
        workers: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<ExtractionJob>(QUEUE_CAP);
        let rx = Arc::new(Mutex::new(rx));
        let states: Arc<DashMap<String, JobState>> = Arc::new(DashMap::new());

        for worker_id in 0..workers.max(1) {
            let rx = rx.clone();
            let extractor = extractor.clone();
            let store = store.clone();
            let states = states.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else {
                        debug!(worker_id, "extraction queue closed, worker exiting");
                        break;
                    };
                    run_job(job, &extractor, &store, &states).await;
                }
            });
        }

        Self { tx, states }
    }

    /// Schedule an extraction over the given window. Never blocks.
    ///
    /// Returns false when the trigger coalesced with an in-flight job for
    /// the same scope (or the queue was full).
    pub fn schedule(&self, scope: Scope, window: Vec<ChatMessage>) -> bool {
        let key = scope.collection_name();

        {
            let entry = self.states.entry(key.clone());
            match entry {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    debug!(scope = %key, "extraction already in flight, coalescing trigger");
                    return false;
                }
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    vacant.insert(JobState::Scheduled);
                }
            }
        }

        match self.tx.try_send(ExtractionJob { scope, window }) {
            Ok(()) => true,
            Err(e) => {
                self.states.remove(&key);
                warn!(scope = %key, error = %e, "extraction queue full, dropping trigger");
                false
            }
        }
    }

    /// Whether no job is scheduled or running for the scope.
    pub fn is_idle(&self, scope: &Scope) -> bool {
        !self.states.contains_key(&scope.collection_name())
    }
}

async fn run_job(
    job: ExtractionJob,
    extractor: &MemoryExtractor,
    store: &MemoryStore,
    states: &DashMap<String, JobState>,
) {
    let key = job.scope.collection_name();
    states.insert(key.clone(), JobState::Running);

    let drafts = extractor.extract(&job.window).await;
    let mut stored = 0usize;
    for draft in drafts {
        match store.insert(&job.scope, draft).await {
            Ok(Some(_)) => stored += 1,
            Ok(None) => {}
            Err(e) => {
                // Memory-layer failures degrade personalization but never
                // reach the reply path.
                warn!(scope = %key, error = %e, "failed to store extracted fragment");
            }
        }
    }

    if stored > 0 {
        info!(scope = %key, stored, "extraction stored fragments");
    } else {
        debug!(scope = %key, "extraction stored no fragments");
    }

    states.remove(&key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use mnemo_core::traits::ChatAdapter;
    use mnemo_core::types::{CompletionRequest, CompletionResponse, Speaker};
    use mnemo_core::MnemoError;
    use mnemo_memory::SimpleEmbedder;
    use std::time::Duration;

    struct StubChat {
        response: String,
        delay: Duration,
    }

    #[async_trait]
    impl ChatAdapter for StubChat {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, MnemoError> {
            tokio::time::sleep(self.delay).await;
            Ok(CompletionResponse {
                content: self.response.clone(),
                model: "stub".to_string(),
                usage: None,
            })
        }
    }

    fn window(content: &str) -> Vec<ChatMessage> {
        vec![ChatMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            session_id: "s1".to_string(),
            role: Speaker::User,
            content: content.to_string(),
            timestamp: Utc::now(),
        }]
    }

    fn scoring_response() -> String {
        r#"{"fragments": [{"content": "我叫张三，是一名软件工程师", "speaker": "user",
            "type": "fact", "sentiment": "neutral", "importance_score": 6,
            "reasoning": "身份信息"}]}"#
            .to_string()
    }

    async fn wait_idle(scheduler: &ExtractionScheduler, scope: &Scope) {
        for _ in 0..200 {
            if scheduler.is_idle(scope) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("extraction did not finish in time");
    }

    #[tokio::test]
    async fn scheduled_job_stores_fragments() {
        let store = Arc::new(
            MemoryStore::open_in_memory(Arc::new(SimpleEmbedder::new()))
                .await
                .unwrap(),
        );
        let extractor = Arc::new(MemoryExtractor::new(
            Arc::new(StubChat {
                response: scoring_response(),
                delay: Duration::ZERO,
            }),
            None,
            0.1,
        ));
        let scheduler = ExtractionScheduler::spawn(extractor, store.clone(), 2);
        let scope = Scope::new("u1", "s1", "warm");

        assert!(scheduler.schedule(scope.clone(), window("我叫张三，是一名软件工程师")));
        wait_idle(&scheduler, &scope).await;

        assert_eq!(store.count(&scope).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_triggers_coalesce_per_scope() {
        let store = Arc::new(
            MemoryStore::open_in_memory(Arc::new(SimpleEmbedder::new()))
                .await
                .unwrap(),
        );
        let extractor = Arc::new(MemoryExtractor::new(
            Arc::new(StubChat {
                response: scoring_response(),
                delay: Duration::from_millis(200),
            }),
            None,
            0.1,
        ));
        let scheduler = ExtractionScheduler::spawn(extractor, store.clone(), 2);
        let scope = Scope::new("u1", "s1", "warm");

        assert!(scheduler.schedule(scope.clone(), window("第一次触发")));
        // Second trigger while the first is scheduled/running coalesces.
        assert!(!scheduler.schedule(scope.clone(), window("第二次触发")));

        wait_idle(&scheduler, &scope).await;
        // After completion the scope accepts new triggers again.
        assert!(scheduler.schedule(scope.clone(), window("第三次触发")));
        wait_idle(&scheduler, &scope).await;
    }

    #[tokio::test]
    async fn distinct_scopes_do_not_coalesce() {
        let store = Arc::new(
            MemoryStore::open_in_memory(Arc::new(SimpleEmbedder::new()))
                .await
                .unwrap(),
        );
        let extractor = Arc::new(MemoryExtractor::new(
            Arc::new(StubChat {
                response: scoring_response(),
                delay: Duration::from_millis(100),
            }),
            None,
            0.1,
        ));
        let scheduler = ExtractionScheduler::spawn(extractor, store.clone(), 2);
        let scope_a = Scope::new("u1", "sa", "warm");
        let scope_b = Scope::new("u1", "sb", "warm");

        assert!(scheduler.schedule(scope_a.clone(), window("A")));
        assert!(scheduler.schedule(scope_b.clone(), window("B")));
        wait_idle(&scheduler, &scope_a).await;
        wait_idle(&scheduler, &scope_b).await;
    }

    #[tokio::test]
    async fn extraction_failure_leaves_store_untouched_and_recovers() {
        let store = Arc::new(
            MemoryStore::open_in_memory(Arc::new(SimpleEmbedder::new()))
                .await
                .unwrap(),
        );
        let extractor = Arc::new(MemoryExtractor::new(
            Arc::new(StubChat {
                response: "这不是 JSON".to_string(),
                delay: Duration::ZERO,
            }),
            None,
            0.1,
        ));
        let scheduler = ExtractionScheduler::spawn(extractor, store.clone(), 1);
        let scope = Scope::new("u1", "s1", "warm");

        assert!(scheduler.schedule(scope.clone(), window("闲聊")));
        wait_idle(&scheduler, &scope).await;
        assert_eq!(store.count(&scope).await.unwrap(), 0);
        // Scope is idle again; no retry was queued.
        assert!(scheduler.is_idle(&scope));
    }
}
