// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based memory extraction from conversation windows.
//!
//! One scoring-LLM call per window: the model receives the labeled
//! transcript plus a dual rubric (user and assistant sides score
//! differently) and returns structured JSON fragments with reasoning.
//! Scores then pass rule-based correction and the differentiated
//! threshold filter. Any failure yields zero fragments; the reply path
//! never sees extraction errors, and the next window covers the same
//! messages again.

use std::collections::BTreeMap;
use std::sync::Arc;

use mnemo_core::traits::ChatAdapter;
use mnemo_core::types::{ChatMessage, ChatTurn, CompletionRequest, Speaker};
use mnemo_core::MnemoError;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::scoring;
use crate::types::{FragmentDraft, FragmentKind, Sentiment};

/// System prompt for the scoring LLM. The dual rubric mirrors the
/// companion-memory scoring contract: user fragments score on emotional
/// intensity, personalization, intimacy, and preference clarity;
/// assistant fragments score on commitments, advice value, and emotional
/// support.
const SCORING_SYSTEM_PROMPT: &str = r#"你是一个专业的陪伴型对话记忆分析助手。从对话中提取能帮助 AI 了解用户、建立情感连接的记忆片段，同时提取 user 和 assistant 两侧的内容，但使用不同的评分标准。

## User (用户) 评分标准 (1-10分)
- 情感强度 (0-3分)：强烈情感词（超级、特别、极其）3分；明确情感2分；轻微1分
- 个性化程度 (0-3分)：童年/个人经历3分；明确偏好2分；一般个人信息（职业、年龄）1分
- 亲密度 (0-2分)：表达对你的信任/依赖2分；分享个人感受1分
- 偏好明确性 (0-2分)：明确喜恶（最爱、讨厌）2分；有倾向1分
规则：明确喜恶至少5分；童年/深层经历至少7分；对AI的信任/情感至少7分。

## Assistant (AI) 评分标准 (1-10分)
- 承诺重要性 (0-4分)：重要承诺（我会一直陪着你、我保证）4分；约定计划3分；一般承诺2分
- 建议价值 (0-3分)：具体步骤/解决方案3分；推荐尝试2分；一般提醒1分
- 情感支持强度 (0-3分)：深度支持（你不是一个人、我一直在）3分；明确鼓励2分
规则：重要承诺至少6分；深度建议至少5分；深度情感支持至少6分；普通回复（好的、没问题）1-2分。

## 提取规则
1. 每个片段必须带 "speaker" 字段（"user" 或 "assistant"）
2. 只提取陈述句，不提取问题、寒暄、简单确认
3. type 取值：preference/event/fact/relationship
4. sentiment 取值：positive/neutral/negative
5. importance_score 必须是 1-10 的整数，并附简短 reasoning

## 示例
输入: "user: 我最喜欢吃北京烤鸭"
输出: {"fragments": [{"content": "我最喜欢吃北京烤鸭", "speaker": "user", "type": "preference", "sentiment": "positive", "importance_score": 5, "reasoning": "明确偏好表达"}]}

输入: "assistant: 我会一直陪着你，无论什么时候你需要我"
输出: {"fragments": [{"content": "我会一直陪着你，无论什么时候你需要我", "speaker": "assistant", "type": "relationship", "sentiment": "positive", "importance_score": 9, "reasoning": "核心陪伴承诺"}]}

输入: "assistant: 好的，我明白了"
输出: {"fragments": []}

没有值得记忆的内容时返回 {"fragments": []}。只返回 JSON，不要任何其他文字。"#;

/// Max tokens for the scoring call; windows are short.
const SCORING_MAX_TOKENS: u32 = 2048;

/// Extracts validated, score-corrected fragments from conversation windows.
pub struct MemoryExtractor {
    chat: Arc<dyn ChatAdapter>,
    /// Model override for the scoring call; `None` uses the adapter default.
    model: Option<String>,
    temperature: f32,
}

impl MemoryExtractor {
    pub fn new(chat: Arc<dyn ChatAdapter>, model: Option<String>, temperature: f32) -> Self {
        Self {
            chat,
            model,
            temperature,
        }
    }

    /// Run one extraction over a window of messages.
    ///
    /// Returns surviving fragments sorted by score descending. LLM failure
    /// and malformed output both yield an empty list.
    pub async fn extract(&self, window: &[ChatMessage]) -> Vec<FragmentDraft> {
        if window.is_empty() {
            return vec![];
        }

        let transcript = build_transcript(window);
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatTurn::system(SCORING_SYSTEM_PROMPT),
                ChatTurn::user(format!(
                    "请从以下对话中提取重要的记忆片段并评分。\n\n对话内容:\n{transcript}\n\n只返回 JSON。"
                )),
            ],
            temperature: self.temperature,
            max_tokens: SCORING_MAX_TOKENS,
        };

        let response = match self.chat.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "scoring LLM call failed, extraction yields no fragments");
                return vec![];
            }
        };

        let raw_fragments = match parse_scoring_response(&response.content) {
            Ok(fragments) => fragments,
            Err(e) => {
                warn!(error = %e, "scoring response rejected, extraction yields no fragments");
                debug!(raw = %response.content, "rejected scoring response");
                return vec![];
            }
        };

        let mut drafts: Vec<FragmentDraft> = raw_fragments
            .into_iter()
            .filter_map(|raw| match validate_fragment(raw) {
                Ok(draft) => Some(draft),
                Err(reason) => {
                    debug!(%reason, "dropping invalid fragment");
                    None
                }
            })
            .filter(|draft| scoring::passes_threshold(draft.speaker, draft.importance_score))
            .collect();

        drafts.sort_by(|a, b| b.importance_score.cmp(&a.importance_score));
        drafts
    }
}

/// One fragment as returned by the scoring LLM, before validation.
#[derive(Debug, Deserialize)]
pub struct RawFragment {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
    /// Accepts integer, float, or numeric string; coerced later.
    #[serde(default)]
    pub importance_score: Option<serde_json::Value>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Envelope shape the prompt asks for.
#[derive(Debug, Deserialize)]
struct ScoringEnvelope {
    fragments: Vec<RawFragment>,
}

/// Concatenate the window into a speaker-labeled transcript.
pub fn build_transcript(window: &[ChatMessage]) -> String {
    window
        .iter()
        .map(|msg| format!("{}: {}", msg.role.as_str(), msg.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the scoring response into raw fragments.
///
/// Tolerates markdown code fences and surrounding prose; accepts either
/// the `{"fragments": [...]}` envelope or a bare array. A response with
/// no recognizable JSON rejects the whole extraction.
pub fn parse_scoring_response(response: &str) -> Result<Vec<RawFragment>, MnemoError> {
    let trimmed = response.trim();

    // Locate the JSON payload: first `{` or `[` through the matching tail.
    let object_slice = slice_between(trimmed, '{', '}');
    let array_slice = slice_between(trimmed, '[', ']');

    if let Some(slice) = object_slice {
        if let Ok(envelope) = serde_json::from_str::<ScoringEnvelope>(slice) {
            return Ok(envelope.fragments);
        }
    }
    if let Some(slice) = array_slice {
        if let Ok(fragments) = serde_json::from_str::<Vec<RawFragment>>(slice) {
            return Ok(fragments);
        }
    }

    Err(MnemoError::MalformedOutput(
        "scoring response did not contain a fragments object or array".to_string(),
    ))
}

fn slice_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Validate one raw fragment into a draft.
///
/// Coerces the score to an integer clamped to [1, 10], applies the
/// correction rules, and rejects fragments with empty content or unknown
/// type/sentiment/speaker values.
pub fn validate_fragment(raw: RawFragment) -> Result<FragmentDraft, String> {
    let content = raw.content.trim().to_string();
    if content.is_empty() {
        return Err("empty content".to_string());
    }

    // Missing speaker defaults to user; an explicit unknown value rejects.
    let speaker = match raw.speaker.as_deref() {
        None => Speaker::User,
        Some(s) => Speaker::parse(s).ok_or_else(|| format!("unknown speaker `{s}`"))?,
    };

    let kind = match raw.kind.as_deref() {
        None => FragmentKind::Fact,
        Some(s) => FragmentKind::parse(s).ok_or_else(|| format!("unknown type `{s}`"))?,
    };

    let sentiment = match raw.sentiment.as_deref() {
        None => Sentiment::Neutral,
        Some(s) => Sentiment::parse(s).ok_or_else(|| format!("unknown sentiment `{s}`"))?,
    };

    let reasoning = raw.reasoning.unwrap_or_default();
    let score = coerce_score(raw.importance_score.as_ref());
    let score = scoring::apply_corrections(speaker, &content, &reasoning, score);

    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), "chat".to_string());
    if !reasoning.is_empty() {
        metadata.insert("reasoning".to_string(), reasoning);
    }

    Ok(FragmentDraft {
        content,
        speaker,
        kind,
        sentiment,
        entities: raw.entities,
        topics: raw.topics,
        importance_score: score,
        confidence: 0.8,
        metadata,
    })
}

/// Coerce an LLM-provided score (integer, float, or numeric string) to an
/// integer in [1, 10]. Missing or unparseable values default to 5.
fn coerce_score(value: Option<&serde_json::Value>) -> i32 {
    let score = match value {
        Some(serde_json::Value::Number(n)) => {
            n.as_i64().map(|v| v as i32).unwrap_or_else(|| {
                n.as_f64().map(|v| v.trunc() as i32).unwrap_or(5)
            })
        }
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|v| v.trunc() as i32)
            .unwrap_or(5),
        _ => 5,
    };
    score.clamp(1, 10)
}
