//! 技能执行器与注册表

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::backend::AgentBackend;
use super::skill::Skill;
use super::OrchestrationError;
use crate::core::{ProgressUpdate, Task, TaskContext, TaskExecutor};
use crate::session::{Role, SessionStore};

const TOTAL_STEPS: u32 = 4;

/// 以 Agent 完成一个技能任务：载入请求 → 组装会话上下文 → 运行 Agent → 完成
///
/// 每一步之间调用 `check_pause`，因此暂停 / 取消在步骤边界生效。
pub struct AgentSkillExecutor {
    skill: Skill,
    backend: Arc<dyn AgentBackend>,
    sessions: Arc<dyn SessionStore>,
    max_history_turns: usize,
}

impl AgentSkillExecutor {
    pub fn new(
        skill: Skill,
        backend: Arc<dyn AgentBackend>,
        sessions: Arc<dyn SessionStore>,
        max_history_turns: usize,
    ) -> Self {
        Self {
            skill,
            backend,
            sessions,
            max_history_turns,
        }
    }

    pub fn skill(&self) -> Skill {
        self.skill
    }
}

#[async_trait]
impl TaskExecutor for AgentSkillExecutor {
    async fn run(&self, task: Task, ctx: TaskContext) -> anyhow::Result<Value> {
        ctx.update_progress(ProgressUpdate::step(1, TOTAL_STEPS, "Loading request...")).await;
        ctx.check_pause().await?;
        let prompt = self.skill.build_prompt(&task.input);

        ctx.update_progress(ProgressUpdate::step(2, TOTAL_STEPS, "Building session context...")).await;
        ctx.check_pause().await?;
        let agent_context = match task.session_id.as_deref() {
            Some(session_id) => {
                self.sessions
                    .get_context_for_agent(session_id, true, self.max_history_turns)
                    .await
            }
            None => None,
        };

        ctx.update_progress(ProgressUpdate::step(
            3,
            TOTAL_STEPS,
            format!("Running {} agent...", self.skill),
        ))
        .await;
        ctx.check_pause().await?;
        tracing::debug!(task_id = %task.id, skill = %self.skill, "dispatching to agent");
        let reply = self.backend.run(self.skill, &prompt, agent_context.as_ref()).await?;

        if let Some(session_id) = task.session_id.as_deref() {
            let mut metadata = serde_json::Map::new();
            metadata.insert("task_id".into(), json!(task.id));
            self.sessions
                .add_message(session_id, Role::User, &prompt, Some(metadata.clone()))
                .await;
            self.sessions
                .add_message(session_id, Role::Assistant, &reply, Some(metadata))
                .await;
        }

        ctx.update_progress(ProgressUpdate::step(4, TOTAL_STEPS, "Analysis complete!")).await;
        let mut output = serde_json::Map::new();
        output.insert(self.skill.output_key().to_string(), Value::String(reply));
        Ok(Value::Object(output))
    }
}

/// 技能 → 执行器映射，启动时构建一次
pub struct SkillRegistry {
    executors: HashMap<Skill, Arc<dyn TaskExecutor>>,
}

impl SkillRegistry {
    /// 空注册表
    pub fn empty() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// 为所有技能注册同一后端的 [`AgentSkillExecutor`]
    pub fn new(backend: Arc<dyn AgentBackend>, sessions: Arc<dyn SessionStore>, max_history_turns: usize) -> Self {
        let mut registry = Self::empty();
        for skill in Skill::ALL {
            registry.register(
                skill,
                Arc::new(AgentSkillExecutor::new(
                    skill,
                    Arc::clone(&backend),
                    Arc::clone(&sessions),
                    max_history_turns,
                )),
            );
        }
        registry
    }

    pub fn register(&mut self, skill: Skill, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(skill, executor);
    }

    pub fn get(&self, skill: Skill) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(&skill).cloned()
    }

    /// 按任务名解析执行器
    pub fn resolve(&self, task_name: &str) -> Result<Arc<dyn TaskExecutor>, OrchestrationError> {
        Skill::parse(task_name)
            .and_then(|skill| self.get(skill))
            .ok_or_else(|| OrchestrationError::UnknownSkill(task_name.to_string()))
    }

    /// 已注册的技能
    pub fn skills(&self) -> Vec<Skill> {
        Skill::ALL
            .into_iter()
            .filter(|s| self.executors.contains_key(s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TaskManager, TaskStatus};
    use crate::orchestration::MockAgentBackend;
    use crate::session::{AgentContext, MemorySessionStore};
    use serde_json::Map;
    use std::time::Duration;

    struct FailingBackend;

    #[async_trait]
    impl AgentBackend for FailingBackend {
        async fn run(&self, _skill: Skill, _prompt: &str, _ctx: Option<&AgentContext>) -> Result<String, OrchestrationError> {
            Err(OrchestrationError::Backend("model quota exhausted".into()))
        }
    }

    fn registry(backend: Arc<dyn AgentBackend>) -> (SkillRegistry, Arc<MemorySessionStore>) {
        let sessions = Arc::new(MemorySessionStore::default());
        (SkillRegistry::new(backend, sessions.clone(), 20), sessions)
    }

    #[test]
    fn test_resolve() {
        let (registry, _) = registry(Arc::new(MockAgentBackend::new()));
        assert_eq!(registry.skills(), Skill::ALL.to_vec());
        assert!(registry.resolve("risk_analysis").is_ok());
        assert!(registry.resolve("contract_search").is_ok());
        assert!(matches!(
            registry.resolve("document_ingestion"),
            Err(OrchestrationError::UnknownSkill(name)) if name == "document_ingestion"
        ));
        assert!(SkillRegistry::empty().resolve("search").is_err());
    }

    #[tokio::test]
    async fn test_skill_executor_runs_four_steps() {
        let (registry, sessions) = registry(Arc::new(MockAgentBackend::new()));
        let session = sessions.create(Some("u1".into()), vec!["d1".into()], Map::new()).await;
        let manager = TaskManager::in_memory(64);
        let task = manager
            .create(
                "contract_analysis",
                json!({"document_id": "d1", "query": "List termination rights"}),
                Some("u1".into()),
                Some(session.session_id.clone()),
            )
            .await;

        manager
            .execute(&task.id, registry.resolve(&task.name).unwrap())
            .await
            .unwrap();

        let done = manager.get(&task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress.current_step, 4);
        assert_eq!(done.progress.percentage, 100.0);
        let analysis = done.output.unwrap()["analysis"].as_str().unwrap().to_string();
        assert!(analysis.contains("Analyze document d1: List termination rights"));

        let history = sessions.get_history(&session.session_id, 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, analysis);
        assert_eq!(history[1].metadata["task_id"], json!(task.id));
    }

    #[tokio::test]
    async fn test_backend_failure_fails_task() {
        let (registry, _) = registry(Arc::new(FailingBackend));
        let manager = TaskManager::in_memory(64);
        let task = manager.create("report", json!({}), None, None).await;

        manager.execute(&task.id, registry.resolve("report").unwrap()).await.unwrap();

        let failed = manager.get(&task.id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("Agent backend error: model quota exhausted"));
        assert_eq!(failed.progress.current_step, 3);
    }

    #[tokio::test]
    async fn test_pause_during_agent_call_completes_after_resume() {
        let (registry, _) = registry(Arc::new(MockAgentBackend::with_latency(Duration::from_millis(100))));
        let manager = TaskManager::in_memory(64);
        let task = manager
            .create("contract_analysis", json!({"document_id": "d1"}), None, None)
            .await;

        let runner = {
            let manager = manager.clone();
            let id = task.id.clone();
            let executor = registry.resolve("contract_analysis").unwrap();
            tokio::spawn(async move { manager.execute(&id, executor).await })
        };
        tokio::time::timeout(Duration::from_secs(2), async {
            while manager.get(&task.id).await.unwrap().progress.current_step < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("agent step reached");
        assert!(manager.pause(&task.id).await);

        // 后端返回后任务仍保持暂停
        tokio::time::sleep(Duration::from_millis(200)).await;
        let held = manager.get(&task.id).await.unwrap();
        assert_eq!(held.status, TaskStatus::Paused);
        assert!(held.output.is_none());

        assert!(manager.resume(&task.id).await);
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("execute finishes after resume")
            .unwrap()
            .unwrap();
        let done = manager.get(&task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.output.unwrap()["analysis"].is_string());
    }
}
