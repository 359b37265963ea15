//! ContractGuard - 合同分析后端的长任务与文档分块核心
//!
//! 模块划分：
//! - **broker**: 发布 / 订阅与带 TTL 的缓存抽象（内存实现）
//! - **chunking**: 条款感知的法律文本分块
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 长任务管理器：状态机、暂停 / 恢复 / 取消、人工输入、检查点
//! - **observability**: 日志初始化
//! - **orchestration**: 任务名 → 技能执行器，Agent 后端抽象
//! - **session**: 会话与对话历史
//! - **api**: HTTP / WebSocket 接口（feature `web`）

#[cfg(feature = "web")]
pub mod api;
pub mod broker;
pub mod chunking;
pub mod config;
pub mod core;
pub mod observability;
pub mod orchestration;
pub mod session;
