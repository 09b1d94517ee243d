// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the mnemo workspace: a mock chat adapter and a
//! full-stack harness over a temporary directory.

pub mod harness;
pub mod mock_chat;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_chat::MockChatAdapter;
