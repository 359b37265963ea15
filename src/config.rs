//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CONTRACTGUARD__*` 覆盖（双下划线表示嵌套，如 `CONTRACTGUARD__WEB__PORT=9000`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::chunking::ChunkingConfig;

/// 环境变量前缀
const ENV_PREFIX: &str = "CONTRACTGUARD";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub web: WebSection,
    pub chunking: ChunkingConfig,
    pub tasks: TasksSection,
    pub session: SessionSection,
    pub logging: LoggingSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "contractguard".to_string(),
        }
    }
}

/// [web] 段：HTTP / WebSocket 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub host: String,
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl WebSection {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// [tasks] 段：快照保留时间与更新通道容量
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TasksSection {
    pub snapshot_ttl_secs: u64,
    /// 每个订阅者可缓冲的更新数，落后更多时跳过旧消息
    pub channel_capacity: usize,
}

impl Default for TasksSection {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: 86_400,
            channel_capacity: 64,
        }
    }
}

impl TasksSection {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }
}

/// [session] 段：会话过期与提供给 Agent 的历史轮数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub ttl_secs: u64,
    pub max_history_turns: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            max_history_turns: 20,
        }
    }
}

/// [logging] 段；`RUST_LOG` 优先
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 CONTRACTGUARD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CONTRACTGUARD__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, skipping");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
