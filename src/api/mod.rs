//! HTTP / WebSocket 接口
//!
//! - `/api/v1/tasks`：长任务的创建、查询、执行与控制
//! - `/api/v1/sessions`：会话与对话历史
//! - `/api/v1/documents/chunk`：条款感知分块
//! - `/ws/task/:id`：任务更新推送

mod documents;
mod sessions;
mod tasks;
mod ws;

use std::sync::Arc;

use axum::{http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::broker::{InMemoryCache, InMemoryPubSub};
use crate::chunking::ClauseChunker;
use crate::config::AppConfig;
use crate::core::TaskManager;
use crate::orchestration::{MockAgentBackend, SkillRegistry};
use crate::session::{MemorySessionStore, SessionStore};

/// 处理函数的错误类型
pub(crate) type ApiError = (StatusCode, String);

/// 共享状态：各组件由调用方构造后注入
pub struct AppState {
    pub tasks: TaskManager,
    /// 任务快照与检查点缓存，定期清理过期项
    pub cache: Arc<InMemoryCache>,
    pub sessions: Arc<dyn SessionStore>,
    pub skills: Arc<SkillRegistry>,
    pub chunker: Arc<ClauseChunker>,
    pub config: AppConfig,
}

impl AppState {
    /// 按配置组装内存实现，技能使用 [`MockAgentBackend`]
    pub fn new(config: AppConfig) -> Self {
        let cache = Arc::new(InMemoryCache::new());
        let tasks = TaskManager::with_snapshot_ttl(
            Arc::new(InMemoryPubSub::new(config.tasks.channel_capacity)),
            cache.clone(),
            config.tasks.snapshot_ttl(),
        );
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(config.session.ttl_secs));
        let skills = SkillRegistry::new(
            Arc::new(MockAgentBackend::new()),
            Arc::clone(&sessions),
            config.session.max_history_turns,
        );
        Self {
            tasks,
            cache,
            sessions,
            skills: Arc::new(skills),
            chunker: Arc::new(ClauseChunker::new(config.chunking)),
            config,
        }
    }

    /// 替换技能注册表
    pub fn with_skills(mut self, skills: SkillRegistry) -> Self {
        self.skills = Arc::new(skills);
        self
    }

    /// 清理过期会话与过期缓存项，返回 (会话数, 缓存项数)
    pub async fn sweep_expired(&self) -> (usize, usize) {
        let sessions = self.sessions.cleanup_expired().await;
        let entries = self.cache.purge_expired().await;
        if sessions > 0 || entries > 0 {
            tracing::info!(sessions, entries, "expired state cleaned up");
        }
        (sessions, entries)
    }
}

/// 构建完整路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .merge(tasks::routes())
        .merge(sessions::routes())
        .merge(documents::routes())
        .merge(ws::routes())
        .with_state(state)
}

async fn health(axum::extract::State(state): axum::extract::State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": state.config.app.name,
        "tasks": state.tasks.len().await,
        "executing": state.tasks.executing_count().await,
        "sessions": state.sessions.active_count().await,
    }))
}
