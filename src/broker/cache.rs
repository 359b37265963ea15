//! 带 TTL 的键值缓存（任务快照与检查点持久化）

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::BrokerError;

/// TTL 超出 `Instant` 可表示范围时使用的过期期限（约 100 年）
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 86_400);

/// 缓存接口
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, BrokerError>;

    /// 写入并设置过期时间，成功返回 true
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<bool, BrokerError>;

    async fn delete(&self, key: &str) -> Result<bool, BrokerError>;
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// 进程内缓存；所有键带统一前缀，读取时惰性淘汰过期项
pub struct InMemoryCache {
    prefix: String,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_prefix("tasks")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    /// 清理过期项，返回清理数量
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, BrokerError> {
        let full_key = self.full_key(key);
        {
            let entries = self.entries.read().await;
            match entries.get(&full_key) {
                Some(entry) if entry.expires_at > Instant::now() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().await.remove(&full_key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<bool, BrokerError> {
        let now = Instant::now();
        let entry = CacheEntry {
            value: value.clone(),
            expires_at: now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE),
        };
        self.entries.write().await.insert(self.full_key(key), entry);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, BrokerError> {
        Ok(self.entries.write().await.remove(&self.full_key(key)).is_some())
    }
}
