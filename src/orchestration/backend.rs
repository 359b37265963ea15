//! Agent 后端抽象与 Mock 实现（无需模型服务即可跑通任务流程）

use std::time::Duration;

use async_trait::async_trait;

use super::skill::Skill;
use super::OrchestrationError;
use crate::session::AgentContext;

/// 调用具体 Agent 的接口
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// 以技能对应的 Agent 处理请求，返回最终回复
    async fn run(&self, skill: Skill, prompt: &str, context: Option<&AgentContext>) -> Result<String, OrchestrationError>;
}

/// Mock 后端：回显请求，可选模拟耗时
#[derive(Debug, Default, Clone)]
pub struct MockAgentBackend {
    latency: Duration,
}

impl MockAgentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl AgentBackend for MockAgentBackend {
    async fn run(&self, skill: Skill, prompt: &str, context: Option<&AgentContext>) -> Result<String, OrchestrationError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let turns = context.and_then(|c| c.turn_count).unwrap_or(0);
        Ok(format!("[{}] Echo from Mock ({} prior turns): {}", skill, turns, prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_prompt() {
        let reply = MockAgentBackend::new()
            .run(Skill::Report, "Generate a summary", None)
            .await
            .unwrap();
        assert_eq!(reply, "[report] Echo from Mock (0 prior turns): Generate a summary");
    }
}
