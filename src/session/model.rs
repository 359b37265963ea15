//! 会话数据结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 发言角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// 历史文本中的前缀
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// 一轮对话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// 会话上下文：当前分析的文档与任意键值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub active_documents: Vec<String>,
    #[serde(default)]
    pub context_data: Map<String, Value>,
}

impl SessionContext {
    pub fn new(user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            created_at: now,
            last_activity: now,
            active_documents: Vec::new(),
            context_data: Map::new(),
        }
    }
}

/// 提供给 Agent 的会话上下文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub session_id: String,
    pub user_id: Option<String>,
    pub active_documents: Vec<String>,
    pub context: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_count: Option<usize>,
}

/// 把若干轮对话格式化为 `User: ...` / `Assistant: ...`，轮与轮之间空一行
pub fn format_history(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_history() {
        let turns = vec![
            ConversationTurn::new(Role::User, "Is clause 7 risky?"),
            ConversationTurn::new(Role::Assistant, "Yes, the indemnity is uncapped."),
        ];
        assert_eq!(
            format_history(&turns),
            "User: Is clause 7 risky?\n\nAssistant: Yes, the indemnity is uncapped."
        );
        assert_eq!(format_history(&[]), "");
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_value(Role::User).unwrap(), json!("user"));
        let turn: ConversationTurn = serde_json::from_value(json!({
            "role": "assistant",
            "content": "ok",
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(turn.role, Role::Assistant);
        assert!(turn.metadata.is_empty());
    }
}
