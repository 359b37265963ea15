//! 执行器上下文
//!
//! 执行器只通过它与管理器交互：汇报进度、在挂起点响应暂停、请求人工输入、保存检查点。
//! 所有操作都作用于所属任务；任务被取消后，挂起点返回 [`TaskError::Cancelled`]。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::TaskError;
use super::manager::{TaskEntry, TaskManager};
use super::task::{ProgressUpdate, TaskStatus};

#[derive(Clone)]
pub struct TaskContext {
    manager: TaskManager,
    task_id: String,
    entry: Arc<TaskEntry>,
}

impl TaskContext {
    pub(crate) fn new(manager: TaskManager, task_id: String, entry: Arc<TaskEntry>) -> Self {
        Self {
            manager,
            task_id,
            entry,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub async fn update_progress(&self, update: ProgressUpdate) {
        self.manager.update_progress_on(&self.entry, update).await;
    }

    /// 当前状态
    pub async fn status(&self) -> TaskStatus {
        self.entry.slot.lock().await.task.status
    }

    /// 阻塞直到闸门打开；任务已被取消时返回错误
    pub async fn check_pause(&self) -> Result<(), TaskError> {
        self.entry.gate.wait_open().await;
        match self.status().await {
            TaskStatus::Cancelled => Err(TaskError::Cancelled),
            _ => Ok(()),
        }
    }

    /// 请求人工输入并等待，返回用户提供的数据
    ///
    /// 任务处于暂停状态时先等待恢复再发起请求。
    pub async fn request_input(&self, prompt: impl Into<String>, schema: Option<Value>) -> Result<Option<Value>, TaskError> {
        let prompt = prompt.into();
        loop {
            self.check_pause().await?;
            match self
                .manager
                .request_input_on(&self.entry, prompt.clone(), schema.clone())
                .await
            {
                Ok(()) => break,
                // check_pause 与请求之间被暂停了
                Err(TaskError::InvalidTransition {
                    from: TaskStatus::Paused,
                    ..
                }) => continue,
                Err(TaskError::InvalidTransition {
                    from: TaskStatus::Cancelled,
                    ..
                }) => return Err(TaskError::Cancelled),
                Err(e) => return Err(e),
            }
        }

        self.check_pause().await?;
        Ok(self.entry.slot.lock().await.task.user_input.clone())
    }

    /// 以类型 `T` 的 JSON Schema 请求输入，并把回复反序列化为 `T`
    pub async fn request_typed_input<T>(&self, prompt: impl Into<String>) -> anyhow::Result<T>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))?;
        let reply = self
            .request_input(prompt, Some(schema))
            .await?
            .ok_or_else(|| anyhow::anyhow!("no input provided for task {}", self.task_id))?;
        Ok(serde_json::from_value(reply)?)
    }

    pub async fn checkpoint(&self, data: Value) {
        self.manager.checkpoint_on(&self.entry, data).await;
    }

    /// 最近一次检查点；内存中没有时回退到缓存（进程重启后恢复）
    pub async fn get_checkpoint(&self) -> Option<Value> {
        let in_memory = self.entry.slot.lock().await.task.checkpoint_data.clone();
        match in_memory {
            Some(data) => Some(data),
            None => self.manager.load_checkpoint(&self.task_id).await,
        }
    }
}
