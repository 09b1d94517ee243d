// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule-based post-correction of LLM importance scores.
//!
//! The scoring LLM is asked for an integer 1..=10 plus reasoning, but its
//! scores drift on exactly the fragments that must not be lost: identity
//! disclosures, assistant commitments, concrete advice, and references to
//! earlier assistant statements. Each rule matches a fixed marker set
//! against content + reasoning and raises the score to a floor. Rules run
//! in order; later rules can raise further but never lower.
//!
//! The marker sets are part of the scoring contract (see DESIGN.md).

use mnemo_core::types::Speaker;

/// User fragments below this score are dropped before storage.
pub const USER_SCORE_FLOOR: i32 = 5;

/// Assistant fragments below this score are dropped before storage.
/// Lower than the user floor: assistant-side commitments are rare and must
/// not be lost, while user chit-chat is plentiful.
pub const ASSISTANT_SCORE_FLOOR: i32 = 3;

/// Identity disclosures (name, occupation, age) by the user.
const IDENTITY_MARKERS: &[&str] = &[
    "我叫",
    "我的名字",
    "我是一名",
    "我是个",
    "我今年",
    "岁了",
    "我的职业",
    "my name is",
    "i am a",
    "i work as",
];

/// Commitments and pledges by the assistant.
const COMMITMENT_MARKERS: &[&str] = &[
    "我会一直",
    "我保证",
    "我承诺",
    "无论如何",
    "永远",
    "我都在",
    "i promise",
    "i will always",
];

/// Concrete advice by the assistant.
const ADVICE_MARKERS: &[&str] = &[
    "建议",
    "试试",
    "可以尝试",
    "解决方案",
    "你可以",
    "you could try",
    "i suggest",
];

/// Emotional support by the assistant.
const SUPPORT_MARKERS: &[&str] = &[
    "理解你",
    "陪着你",
    "不是一个人",
    "我一直在",
    "支持你",
    "加油",
    "i'm here for you",
    "you are not alone",
];

/// The user quoting or referring to an earlier assistant statement.
const QUOTATION_MARKERS: &[&str] = &[
    "你说过",
    "你之前说",
    "你答应过",
    "你上次说",
    "you said",
    "you promised",
];

/// Apply the correction rules to a raw score.
///
/// `content` is the fragment text; `reasoning` is the scoring LLM's own
/// justification (matched too, since the model often names the signal it
/// then underweights). Returns the corrected score, still in 1..=10.
pub fn apply_corrections(speaker: Speaker, content: &str, reasoning: &str, score: i32) -> i32 {
    let haystack = normalized(content, reasoning);
    let mut score = score.clamp(1, 10);

    match speaker {
        Speaker::User => {
            if matches_any(&haystack, IDENTITY_MARKERS) {
                score = score.max(5);
            }
            if matches_any(&haystack, QUOTATION_MARKERS) {
                score = score.max(7);
            }
        }
        Speaker::Assistant => {
            if matches_any(&haystack, ADVICE_MARKERS) {
                score = score.max(5);
            }
            if matches_any(&haystack, SUPPORT_MARKERS) {
                score = score.max(6);
            }
            if matches_any(&haystack, COMMITMENT_MARKERS) {
                score = score.max(7);
            }
        }
    }

    score.clamp(1, 10)
}

/// Differentiated threshold filter: returns true when the fragment
/// survives storage.
pub fn passes_threshold(speaker: Speaker, score: i32) -> bool {
    match speaker {
        Speaker::User => score >= USER_SCORE_FLOOR,
        Speaker::Assistant => score >= ASSISTANT_SCORE_FLOOR,
    }
}

fn normalized(content: &str, reasoning: &str) -> String {
    let mut haystack = String::with_capacity(content.len() + reasoning.len() + 1);
    haystack.push_str(&content.to_lowercase());
    haystack.push('\n');
    haystack.push_str(&reasoning.to_lowercase());
    haystack
}

fn matches_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| haystack.contains(marker))
}
