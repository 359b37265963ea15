//! 消息代理：发布 / 订阅通道与带 TTL 的缓存
//!
//! 任务管理器只依赖这里的 trait；进程内实现基于 `tokio::sync::broadcast` 与 `RwLock<HashMap>`，
//! 换成外部代理时只需实现同样的接口。

pub mod cache;
pub mod pubsub;

use thiserror::Error;

pub use cache::{Cache, InMemoryCache};
pub use pubsub::{is_terminal_update, task_channel, InMemoryPubSub, PubSub, Subscription};

/// 代理侧错误；任务管理器只记录、不向调用方传播
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
