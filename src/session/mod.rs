//! 会话管理
//!
//! 按会话 ID 保存对话轮次、当前分析的文档与上下文键值，带 TTL 过期；
//! 编排层用它为 Agent 组装提示上下文。

pub mod model;
pub mod store;

pub use model::{format_history, AgentContext, ConversationTurn, Role, SessionContext};
pub use store::{MemorySessionStore, SessionStore};
