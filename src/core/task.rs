//! 长任务数据模型：状态、进度与对外的线上表示

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 任务 ID
pub type TaskId = String;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 已创建，等待执行
    Pending,
    /// 正在执行
    Running,
    /// 已暂停（执行器在下一个 check_pause 处阻塞）
    Paused,
    /// 等待人工输入
    WaitingInput,
    /// 已完成
    Completed,
    /// 执行失败
    Failed,
    /// 已取消
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::WaitingInput => "waiting_input",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// 状态机允许的转换
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Paused)
                | (Running, WaitingInput)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
                | (WaitingInput, Running)
                | (WaitingInput, Cancelled)
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "waiting_input" => Some(Self::WaitingInput),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务进度
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub current_step: u32,
    pub total_steps: u32,
    /// total_steps > 0 时为 current_step / total_steps * 100，否则为 0
    pub percentage: f64,
    pub message: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl TaskProgress {
    fn recompute(&mut self) {
        self.percentage = if self.total_steps > 0 {
            self.current_step as f64 / self.total_steps as f64 * 100.0
        } else {
            0.0
        };
    }

    /// 部分更新：只覆盖提供的字段
    pub fn apply(&mut self, update: ProgressUpdate) {
        if let Some(current) = update.current_step {
            self.current_step = current;
        }
        if let Some(total) = update.total_steps {
            self.total_steps = total;
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(details) = update.details {
            self.details = details;
        }
        self.recompute();
    }
}

/// 进度的部分更新
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub current_step: Option<u32>,
    pub total_steps: Option<u32>,
    pub message: Option<String>,
    pub details: Option<Map<String, Value>>,
}

impl ProgressUpdate {
    /// 最常见的形式：第 current 步 / 共 total 步 + 说明
    pub fn step(current: u32, total: u32, message: impl Into<String>) -> Self {
        Self {
            current_step: Some(current),
            total_steps: Some(total),
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }
}

/// 长任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// 任务类型（如 contract_analysis）
    pub name: String,
    pub status: TaskStatus,
    pub input: Value,
    /// 仅在 COMPLETED 时设置
    pub output: Option<Value>,
    /// 仅在 FAILED 时设置
    pub error: Option<String>,
    pub progress: TaskProgress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// 仅在 WAITING_INPUT 时设置
    pub pending_input_prompt: Option<String>,
    pub pending_input_schema: Option<Value>,
    pub user_input: Option<Value>,
    pub checkpoint_data: Option<Value>,
}

impl Task {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            status: TaskStatus::Pending,
            input,
            output: None,
            error: None,
            progress: TaskProgress::default(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            user_id: None,
            session_id: None,
            pending_input_prompt: None,
            pending_input_schema: None,
            user_input: None,
            checkpoint_data: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// 刷新 updated_at，保证单调不减
    pub(crate) fn touch(&mut self) -> DateTime<Utc> {
        let now = Utc::now().max(self.updated_at);
        self.updated_at = now;
        now
    }

    /// 转换状态并维护时间戳；started_at 与 completed_at 各只写一次
    pub(crate) fn transition(&mut self, next: TaskStatus) {
        debug_assert!(self.status.can_transition_to(next), "{} -> {}", self.status, next);
        let now = self.touch();
        if next == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.status = next;
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            progress: ProgressView {
                current_step: self.progress.current_step,
                total_steps: self.progress.total_steps,
                percentage: self.progress.percentage,
                message: self.progress.message.clone(),
            },
            output: self.output.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            pending_input_prompt: self.pending_input_prompt.clone(),
            pending_input_schema: self.pending_input_schema.clone(),
        }
    }
}

/// 进度的线上表示（不含 details）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressView {
    pub current_step: u32,
    pub total_steps: u32,
    pub percentage: f64,
    pub message: String,
}

/// 任务的线上表示：发布到更新通道、HTTP 响应都使用它
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub progress: ProgressView,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pending_input_prompt: Option<String>,
    pub pending_input_schema: Option<Value>,
}
