//! 编排层：把任务名映射到 Agent 调用
//!
//! 核心任务引擎只看到注入的 [`TaskExecutor`](crate::core::TaskExecutor)；这里负责
//! 技能解析、会话上下文组装与 Agent 后端调用。

pub mod backend;
pub mod executor;
pub mod skill;

use thiserror::Error;

pub use backend::{AgentBackend, MockAgentBackend};
pub use executor::{AgentSkillExecutor, SkillRegistry};
pub use skill::Skill;

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Unknown skill: {0}")]
    UnknownSkill(String),

    #[error("Agent backend error: {0}")]
    Backend(String),
}
