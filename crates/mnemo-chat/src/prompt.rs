// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly: role system prompt, memory block, few-shot examples,
//! history tail, and the current user text.

use mnemo_core::types::{ChatMessage, ChatTurn, Speaker};
use mnemo_identity::RoleProfile;
use mnemo_memory::ScoredFragment;

/// How many trailing history messages are replayed into the prompt.
const HISTORY_TAIL_LEN: usize = 6;

/// Render retrieved fragments as a structured memory block, grouped by
/// origin so the model can tell user facts from its own commitments.
pub fn build_memory_block(fragments: &[ScoredFragment]) -> String {
    if fragments.is_empty() {
        return "（这是我们的第一次对话，还没有关于你的记忆）".to_string();
    }

    let mut user_lines = Vec::new();
    let mut assistant_lines = Vec::new();
    for scored in fragments {
        let f = &scored.fragment;
        let line = format!(
            "- {} (重要性: {}/10, 类型: {}, 情感: {})",
            f.content,
            f.importance_score,
            f.kind.as_str(),
            f.sentiment.as_str()
        );
        match f.speaker {
            Speaker::User => user_lines.push(line),
            Speaker::Assistant => assistant_lines.push(line),
        }
    }

    let mut block = String::new();
    if !user_lines.is_empty() {
        block.push_str("### 用户提到过\n");
        block.push_str(&user_lines.join("\n"));
    }
    if !assistant_lines.is_empty() {
        if !block.is_empty() {
            block.push_str("\n\n");
        }
        block.push_str("### 你曾经说过\n");
        block.push_str(&assistant_lines.join("\n"));
    }
    block
}

/// Assemble the full turn list for the reply LLM.
///
/// Layout: system prompt (role + memory block), few-shot exchanges, the
/// trailing slice of history, then the current user text.
pub fn build_turns(
    role: &RoleProfile,
    fragments: &[ScoredFragment],
    history: &[ChatMessage],
    user_text: &str,
) -> Vec<ChatTurn> {
    let system = format!(
        "{}\n\n## 关于用户的重要记忆\n\n请仔细阅读以下记忆，在回复中体现你的理解，但不要刻意提及记忆本身：\n\n{}",
        role.build_system_prompt(),
        build_memory_block(fragments)
    );

    let mut turns = vec![ChatTurn::system(system)];

    for example in &role.few_shot_examples {
        turns.push(ChatTurn::user(&example.user));
        turns.push(ChatTurn::assistant(&example.assistant));
    }

    let tail_start = history.len().saturating_sub(HISTORY_TAIL_LEN);
    for message in &history[tail_start..] {
        let turn = match message.role {
            Speaker::User => ChatTurn::user(&message.content),
            Speaker::Assistant => ChatTurn::assistant(&message.content),
        };
        turns.push(turn);
    }

    turns.push(ChatTurn::user(user_text));
    turns
}
