// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Role registry: static persona configurations loaded once at startup.
//!
//! A role participates only in prompt assembly and scope partitioning; it
//! never alters the extraction or retrieval contracts.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use mnemo_core::MnemoError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Reply style of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    Compact,
    #[default]
    Conversational,
    Analytical,
    Creative,
    Direct,
}

/// Emotional baseline of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalTone {
    Cold,
    #[default]
    Neutral,
    Warm,
    Enthusiastic,
}

/// Vocabulary constraints for a role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub forbidden: Vec<String>,
    #[serde(default)]
    pub high_frequency: Vec<String>,
}

/// One few-shot exchange shown to the reply LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FewShotExample {
    pub user: String,
    pub assistant: String,
}

/// A persona configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleProfile {
    pub role_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// The role's core identity and driving motivation.
    pub core_identity: String,
    #[serde(default)]
    pub vocabulary: Vocabulary,
    #[serde(default)]
    pub sentence_patterns: Vec<String>,
    #[serde(default)]
    pub emotional_tone: EmotionalTone,
    #[serde(default)]
    pub response_style: ResponseStyle,
    #[serde(default)]
    pub dialogue_principles: Vec<String>,
    /// Hard constraints the assistant must never violate.
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub few_shot_examples: Vec<FewShotExample>,
    /// Optional template with `{name}`, `{description}`, `{core_identity}`,
    /// and `{constraints}` placeholders.
    #[serde(default)]
    pub system_prompt_template: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RoleProfile {
    /// Render the system prompt for this role.
    pub fn build_system_prompt(&self) -> String {
        if let Some(template) = &self.system_prompt_template {
            return template
                .replace("{name}", &self.name)
                .replace("{description}", &self.description)
                .replace("{core_identity}", &self.core_identity)
                .replace(
                    "{constraints}",
                    &self
                        .constraints
                        .iter()
                        .map(|c| format!("- {c}"))
                        .collect::<Vec<_>>()
                        .join("\n"),
                );
        }

        let mut parts = vec![format!("# 角色: {}", self.name)];
        if !self.description.is_empty() {
            parts.push(self.description.clone());
        }
        parts.push(format!("## 核心身份\n{}", self.core_identity));

        if !self.vocabulary.forbidden.is_empty() || !self.vocabulary.high_frequency.is_empty() {
            let mut style = String::from("## 语言风格");
            if !self.vocabulary.forbidden.is_empty() {
                style.push_str(&format!("\n禁用词: {}", self.vocabulary.forbidden.join("、")));
            }
            if !self.vocabulary.high_frequency.is_empty() {
                style.push_str(&format!(
                    "\n高频词: {}",
                    self.vocabulary.high_frequency.join("、")
                ));
            }
            parts.push(style);
        }

        if !self.dialogue_principles.is_empty() {
            parts.push(format!(
                "## 对话原则\n{}",
                self.dialogue_principles
                    .iter()
                    .map(|p| format!("- {p}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            ));
        }

        if !self.constraints.is_empty() {
            parts.push(format!(
                "## 绝对禁忌\n{}",
                self.constraints
                    .iter()
                    .map(|c| format!("- {c}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            ));
        }

        parts.join("\n\n")
    }
}

/// Compiled-in fallback persona used when the config directory does not
/// provide the configured default role.
fn builtin_default_role(role_id: &str) -> RoleProfile {
    RoleProfile {
        role_id: role_id.to_string(),
        name: "暖暖".to_string(),
        description: "温暖贴心的陪伴型助手".to_string(),
        core_identity: "你是一个温暖、贴心的陪伴型 AI 助手，优先关注用户的情感状态，\
                        根据记忆提供个性化的回应，像朋友一样自然交流。"
            .to_string(),
        vocabulary: Vocabulary::default(),
        sentence_patterns: vec![],
        emotional_tone: EmotionalTone::Warm,
        response_style: ResponseStyle::Conversational,
        dialogue_principles: vec![
            "情感连接优先，给予温暖和支持".to_string(),
            "根据记忆中的信息提供个性化回应".to_string(),
            "自然对话，不要刻意提及记忆".to_string(),
            "对敏感话题保持尊重和谨慎".to_string(),
        ],
        constraints: vec![],
        few_shot_examples: vec![],
        system_prompt_template: None,
        metadata: BTreeMap::new(),
    }
}

/// Read-only registry of all roles, loaded once at startup.
pub struct RoleRegistry {
    roles: HashMap<String, RoleProfile>,
    default_role_id: String,
}

impl RoleRegistry {
    /// Load all `*.json` role profiles from a directory.
    ///
    /// Unreadable files are skipped with a warning. When the configured
    /// default role is not among the loaded profiles, a compiled-in
    /// fallback persona is registered under that id so the service always
    /// has a usable default.
    pub async fn load(config_dir: &Path, default_role_id: &str) -> Result<Self, MnemoError> {
        let mut roles = HashMap::new();

        match tokio::fs::read_dir(config_dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await.map_err(|e| {
                    MnemoError::Storage {
                        source: Box::new(e),
                    }
                })? {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    match tokio::fs::read_to_string(&path).await {
                        Ok(content) => match serde_json::from_str::<RoleProfile>(&content) {
                            Ok(role) => {
                                info!(role_id = %role.role_id, name = %role.name, "loaded role");
                                roles.insert(role.role_id.clone(), role);
                            }
                            Err(e) => {
                                warn!(path = %path.display(), error = %e, "skipping invalid role file")
                            }
                        },
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "skipping unreadable role file")
                        }
                    }
                }
            }
            Err(e) => {
                warn!(dir = %config_dir.display(), error = %e, "role config directory unavailable, using built-in default");
            }
        }

        if !roles.contains_key(default_role_id) {
            roles.insert(
                default_role_id.to_string(),
                builtin_default_role(default_role_id),
            );
        }

        Ok(Self {
            roles,
            default_role_id: default_role_id.to_string(),
        })
    }

    /// Look up a role by id.
    pub fn get(&self, role_id: &str) -> Option<&RoleProfile> {
        self.roles.get(role_id)
    }

    /// Whether the role id is known.
    pub fn contains(&self, role_id: &str) -> bool {
        self.roles.contains_key(role_id)
    }

    /// The configured default role.
    pub fn default_role(&self) -> &RoleProfile {
        // The load path guarantees the default id is present.
        &self.roles[&self.default_role_id]
    }

    /// Id of the configured default role.
    pub fn default_role_id(&self) -> &str {
        &self.default_role_id
    }

    /// All registered role ids.
    pub fn role_ids(&self) -> Vec<&str> {
        self.roles.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_dir_falls_back_to_builtin_default() {
        let registry = RoleRegistry::load(Path::new("/nonexistent/roles"), "companion_warm")
            .await
            .unwrap();
        assert!(registry.contains("companion_warm"));
        assert_eq!(registry.default_role().role_id, "companion_warm");
    }

    #[tokio::test]
    async fn loads_roles_from_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let role_json = serde_json::json!({
            "role_id": "analyst_direct",
            "name": "析言",
            "description": "直接的分析型助手",
            "core_identity": "你是一个逻辑严密、直截了当的分析助手。",
            "response_style": "direct",
            "emotional_tone": "cold",
            "constraints": ["不使用表情符号"]
        });
        tokio::fs::write(
            dir.path().join("analyst_direct.json"),
            role_json.to_string(),
        )
        .await
        .unwrap();

        let registry = RoleRegistry::load(dir.path(), "companion_warm").await.unwrap();
        assert!(registry.contains("analyst_direct"));
        assert!(registry.contains("companion_warm"));

        let role = registry.get("analyst_direct").unwrap();
        assert_eq!(role.response_style, ResponseStyle::Direct);
        assert_eq!(role.emotional_tone, EmotionalTone::Cold);
    }

    #[tokio::test]
    async fn invalid_role_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("broken.json"), "{not json")
            .await
            .unwrap();
        let registry = RoleRegistry::load(dir.path(), "companion_warm").await.unwrap();
        assert_eq!(registry.role_ids().len(), 1);
    }

    #[test]
    fn system_prompt_from_template() {
        let mut role = builtin_default_role("r1");
        role.system_prompt_template =
            Some("你是{name}。{core_identity}\n禁忌:\n{constraints}".to_string());
        role.constraints = vec!["不讨论政治".to_string()];
        let prompt = role.build_system_prompt();
        assert!(prompt.starts_with("你是暖暖。"));
        assert!(prompt.contains("- 不讨论政治"));
    }

    #[test]
    fn system_prompt_default_layout_includes_sections() {
        let mut role = builtin_default_role("r1");
        role.vocabulary.forbidden = vec!["抱歉".to_string()];
        role.vocabulary.high_frequency = vec!["我们".to_string()];
        let prompt = role.build_system_prompt();
        assert!(prompt.contains("# 角色: 暖暖"));
        assert!(prompt.contains("## 核心身份"));
        assert!(prompt.contains("禁用词: 抱歉"));
        assert!(prompt.contains("高频词: 我们"));
        assert!(prompt.contains("## 对话原则"));
    }
}
