//! 会话存储抽象层
//!
//! 定义统一的会话接口；内存实现按最后活跃时间做 TTL 过期，读取会刷新活跃时间。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::model::{format_history, AgentContext, ConversationTurn, Role, SessionContext};

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 创建会话
    async fn create(
        &self,
        user_id: Option<String>,
        active_documents: Vec<String>,
        context: Map<String, Value>,
    ) -> SessionContext;

    /// 获取会话（刷新过期时间）
    async fn get(&self, session_id: &str) -> Option<SessionContext>;

    /// 追加一轮对话；会话不存在时返回 false
    async fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Map<String, Value>>,
    ) -> bool;

    /// 最近 `max_turns` 轮对话（旧的在前）
    async fn get_history(&self, session_id: &str, max_turns: usize) -> Vec<ConversationTurn>;

    async fn set_active_documents(&self, session_id: &str, document_ids: Vec<String>) -> bool;

    async fn update_context(&self, session_id: &str, key: &str, value: Value) -> bool;

    /// 删除会话及其历史
    async fn delete(&self, session_id: &str) -> bool;

    /// 清理过期会话
    async fn cleanup_expired(&self) -> usize;

    /// 获取活跃会话数
    async fn active_count(&self) -> usize;

    /// 历史的文本形式
    async fn get_history_text(&self, session_id: &str, max_turns: usize) -> String {
        format_history(&self.get_history(session_id, max_turns).await)
    }

    /// 组装给 Agent 的上下文：会话信息、活跃文档、键值与可选的对话历史
    async fn get_context_for_agent(
        &self,
        session_id: &str,
        include_history: bool,
        max_turns: usize,
    ) -> Option<AgentContext> {
        let session = self.get(session_id).await?;
        let (conversation_history, turn_count) = if include_history {
            let turns = self.get_history(session_id, max_turns).await;
            (Some(format_history(&turns)), Some(turns.len()))
        } else {
            (None, None)
        };

        Some(AgentContext {
            session_id: session.session_id,
            user_id: session.user_id,
            active_documents: session.active_documents,
            context: session.context_data,
            conversation_history,
            turn_count,
        })
    }
}

/// 单个会话
struct StoredSession {
    context: SessionContext,
    history: Vec<ConversationTurn>,
    /// 最后活跃时间
    last_active: Instant,
}

impl StoredSession {
    fn touch(&mut self) {
        self.last_active = Instant::now();
        self.context.last_activity = Utc::now().max(self.context.last_activity);
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_active.elapsed() > ttl
    }
}

/// 内存会话存储
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    /// 会话过期时间
    session_ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(session_ttl_secs: u64) -> Self {
        Self::with_ttl(Duration::from_secs(session_ttl_secs))
    }

    pub fn with_ttl(session_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_ttl,
        }
    }

    /// 在未过期的会话上执行修改，并刷新活跃时间
    async fn with_session<F, R>(&self, session_id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut StoredSession) -> R,
    {
        let mut sessions = self.sessions.write().await;
        let expired = sessions.get(session_id)?.is_expired(self.session_ttl);
        if expired {
            sessions.remove(session_id);
            tracing::debug!(session_id, "session expired");
            return None;
        }
        sessions.get_mut(session_id).map(|session| {
            session.touch();
            f(session)
        })
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(86_400)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(
        &self,
        user_id: Option<String>,
        active_documents: Vec<String>,
        context: Map<String, Value>,
    ) -> SessionContext {
        let mut session = SessionContext::new(user_id);
        session.active_documents = active_documents;
        session.context_data = context;

        self.sessions.write().await.insert(
            session.session_id.clone(),
            StoredSession {
                context: session.clone(),
                history: Vec::new(),
                last_active: Instant::now(),
            },
        );
        tracing::info!(session_id = %session.session_id, user_id = ?session.user_id, "Session created");
        session
    }

    async fn get(&self, session_id: &str) -> Option<SessionContext> {
        self.with_session(session_id, |s| s.context.clone()).await
    }

    async fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Map<String, Value>>,
    ) -> bool {
        let turn = ConversationTurn::new(role, content).with_metadata(metadata.unwrap_or_default());
        let added = self.with_session(session_id, |s| s.history.push(turn)).await.is_some();
        if added {
            tracing::debug!(session_id, role = role.label(), "Message added to session");
        } else {
            tracing::warn!(session_id, "Cannot add message - session not found");
        }
        added
    }

    async fn get_history(&self, session_id: &str, max_turns: usize) -> Vec<ConversationTurn> {
        self.with_session(session_id, |s| {
            let start = s.history.len().saturating_sub(max_turns);
            s.history[start..].to_vec()
        })
        .await
        .unwrap_or_default()
    }

    async fn set_active_documents(&self, session_id: &str, document_ids: Vec<String>) -> bool {
        let count = document_ids.len();
        let updated = self
            .with_session(session_id, |s| s.context.active_documents = document_ids)
            .await
            .is_some();
        if updated {
            tracing::debug!(session_id, document_count = count, "Active documents updated");
        }
        updated
    }

    async fn update_context(&self, session_id: &str, key: &str, value: Value) -> bool {
        self.with_session(session_id, |s| {
            s.context.context_data.insert(key.to_string(), value);
        })
        .await
        .is_some()
    }

    async fn delete(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "Session deleted");
        }
        removed
    }

    async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.session_ttl));
        before - sessions.len()
    }

    async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
