//! 发布 / 订阅通道
//!
//! 语义：发布尽力而为，每个当前订阅者至多收到一次；没有订阅者时发布是静默的空操作，
//! 之后才加入的订阅者收不到之前的消息。

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use super::BrokerError;

/// 终止状态（按约定，携带这些状态的消息结束逻辑上的订阅流）
const TERMINAL_STATUSES: &[&str] = &["completed", "failed", "cancelled"];

/// 任务更新通道名
pub fn task_channel(task_id: &str) -> String {
    format!("task:{}:updates", task_id)
}

/// 消息是否携带终止状态
pub fn is_terminal_update(message: &Value) -> bool {
    message
        .get("status")
        .and_then(Value::as_str)
        .map(|s| TERMINAL_STATUSES.contains(&s))
        .unwrap_or(false)
}

/// 发布 / 订阅接口
#[async_trait]
pub trait PubSub: Send + Sync {
    /// 发布消息，返回收到消息的订阅者数量
    async fn publish(&self, channel: &str, message: &Value) -> Result<usize, BrokerError>;

    /// 建立一个独立的订阅
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError>;

    /// 关闭通道：已有订阅者读完缓冲后流结束
    async fn close(&self, _channel: &str) {}
}

/// 一个订阅；由消费方决定何时停止读取
pub struct Subscription {
    channel: String,
    rx: broadcast::Receiver<Value>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, rx: broadcast::Receiver<Value>) -> Self {
        Self {
            channel: channel.into(),
            rx,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// 下一条消息；落后被丢弃的消息直接跳过，通道关闭时返回 None
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %self.channel, skipped, "subscriber lagged, messages dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 转换为惰性流
    pub fn into_stream(self) -> impl Stream<Item = Value> + Send {
        stream::unfold(self, |mut sub| async move {
            let message = sub.recv().await?;
            Some((message, sub))
        })
    }
}

/// 进程内实现：每个通道一个 broadcast 发送端
pub struct InMemoryPubSub {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<Value>>>,
}

impl InMemoryPubSub {
    /// `capacity` 为每个订阅者可缓冲的消息数
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// 当前有订阅者的通道数
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    async fn publish(&self, channel: &str, message: &Value) -> Result<usize, BrokerError> {
        let sender = match self.channels.read().await.get(channel) {
            Some(sender) => sender.clone(),
            None => return Ok(0),
        };

        match sender.send(message.clone()) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                // 所有订阅者都已离开，回收通道
                let mut channels = self.channels.write().await;
                if channels.get(channel).map(|s| s.receiver_count() == 0).unwrap_or(false) {
                    channels.remove(channel);
                }
                Ok(0)
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(Subscription::new(channel, sender.subscribe()))
    }

    async fn close(&self, channel: &str) {
        if self.channels.write().await.remove(channel).is_some() {
            tracing::debug!(channel, "channel closed");
        }
    }
}
