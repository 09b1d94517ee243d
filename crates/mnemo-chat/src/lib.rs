// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn orchestration for the mnemo service.
//!
//! - **ChatOrchestrator**: per-turn pipeline with per-session
//!   serialization and global parallelism
//! - **ExtractionScheduler**: bounded worker pool with per-scope
//!   coalescing, fed fire-and-forget from the turn pipeline
//! - **prompt**: role + memory + few-shot + history prompt assembly

pub mod orchestrator;
pub mod prompt;
pub mod worker;

pub use orchestrator::{ChatOptions, ChatOrchestrator, ChatOutcome, OrchestratorConfig};
pub use worker::{ExtractionJob, ExtractionScheduler};
