//! 长任务管理器
//!
//! 负责任务生命周期：创建、执行、暂停 / 恢复 / 取消、人工输入、进度与检查点。
//! 每次状态变化都会把 [`TaskView`] 发布到 `task:{id}:updates` 通道。
//!
//! 并发模型：
//! - 注册表 `RwLock<HashMap<TaskId, Arc<TaskEntry>>>`，只由管理器方法修改
//! - 每个任务一把异步互斥锁，“修改 + 发布”在锁内完成，同一任务的转换全序
//! - 执行器在独立的 tokio 任务中运行，取消时通过 [`CancellationToken`] 通知并中止
//! - 缓存 / 发布失败只记录日志，不影响状态转换

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::context::TaskContext;
use super::error::TaskError;
use super::gate::PauseGate;
use super::task::{ProgressUpdate, Task, TaskId, TaskStatus};
use crate::broker::{task_channel, BrokerError, Cache, InMemoryCache, InMemoryPubSub, PubSub, Subscription};

/// 快照与检查点的默认保留时间（24 小时）
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(86_400);

/// 执行器：完成任务的实际工作，通过 [`TaskContext`] 汇报进度、响应暂停、请求输入
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run(&self, task: Task, ctx: TaskContext) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> TaskExecutor for F
where
    F: Fn(Task, TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn run(&self, task: Task, ctx: TaskContext) -> anyhow::Result<Value> {
        (self)(task, ctx).await
    }
}

/// 将异步函数 / 闭包包装为执行器
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn TaskExecutor>
where
    F: Fn(Task, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(f)
}

/// 列表过滤条件（精确匹配）
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub user_id: Option<String>,
}

impl TaskFilter {
    fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self
                .user_id
                .as_deref()
                .map_or(true, |u| task.user_id.as_deref() == Some(u))
    }
}

/// 受任务锁保护的状态
pub(crate) struct TaskSlot {
    pub(crate) task: Task,
    /// 正在执行时的取消令牌
    running: Option<CancellationToken>,
}

/// 注册表中的一项
pub(crate) struct TaskEntry {
    /// 创建顺序，created_at 相同时用于排序
    seq: u64,
    pub(crate) slot: Mutex<TaskSlot>,
    pub(crate) gate: PauseGate,
}

struct ManagerInner {
    tasks: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
    pubsub: Arc<dyn PubSub>,
    cache: Arc<dyn Cache>,
    snapshot_ttl: Duration,
    next_seq: AtomicU64,
}

/// 长任务管理器；克隆开销很小，所有克隆共享同一注册表
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl TaskManager {
    pub fn new(pubsub: Arc<dyn PubSub>, cache: Arc<dyn Cache>) -> Self {
        Self::with_snapshot_ttl(pubsub, cache, DEFAULT_SNAPSHOT_TTL)
    }

    /// 指定快照 / 检查点的保留时间
    pub fn with_snapshot_ttl(pubsub: Arc<dyn PubSub>, cache: Arc<dyn Cache>, snapshot_ttl: Duration) -> Self {
        tracing::info!(ttl_secs = snapshot_ttl.as_secs(), "Task manager initialized");
        Self {
            inner: Arc::new(ManagerInner {
                tasks: RwLock::new(HashMap::new()),
                pubsub,
                cache,
                snapshot_ttl,
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// 进程内代理（测试与单机部署）
    pub fn in_memory(channel_capacity: usize) -> Self {
        Self::new(
            Arc::new(InMemoryPubSub::new(channel_capacity)),
            Arc::new(InMemoryCache::new()),
        )
    }

    pub fn pubsub(&self) -> Arc<dyn PubSub> {
        Arc::clone(&self.inner.pubsub)
    }

    /// 订阅任务更新
    pub async fn subscribe(&self, task_id: &str) -> Result<Subscription, BrokerError> {
        self.inner.pubsub.subscribe(&task_channel(task_id)).await
    }

    pub(crate) async fn entry(&self, task_id: &str) -> Option<Arc<TaskEntry>> {
        self.inner.tasks.read().await.get(task_id).cloned()
    }

    /// 创建任务（PENDING，闸门打开），持久化快照并发布初始状态
    pub async fn create(
        &self,
        name: impl Into<String>,
        input: Value,
        user_id: Option<String>,
        session_id: Option<String>,
    ) -> Task {
        let task = Task::new(name, input).with_user(user_id).with_session(session_id);
        let task_id = task.id.clone();
        let entry = Arc::new(TaskEntry {
            seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
            slot: Mutex::new(TaskSlot { task, running: None }),
            gate: PauseGate::new(),
        });

        let slot = entry.slot.lock().await;
        self.inner.tasks.write().await.insert(task_id.clone(), Arc::clone(&entry));
        self.persist_snapshot(&slot.task).await;
        self.publish(&slot.task).await;

        tracing::info!(task_id = %task_id, name = %slot.task.name, "Task created");
        slot.task.clone()
    }

    pub async fn get(&self, task_id: &str) -> Result<Task, TaskError> {
        let entry = self
            .entry(task_id)
            .await
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        let slot = entry.slot.lock().await;
        Ok(slot.task.clone())
    }

    /// 执行任务，直到执行器结束、失败或任务被取消
    ///
    /// 只接受 PENDING / PAUSED 且当前没有执行器在运行的任务。执行器的错误不会从这里返回：
    /// 成功 → COMPLETED（记录 output），取消 → CANCELLED，其它错误 → FAILED（记录 error）。
    /// 执行器在 PAUSED / WAITING_INPUT 期间返回时，结果保留到恢复（或取消）之后再记录。
    pub async fn execute(&self, task_id: &str, executor: Arc<dyn TaskExecutor>) -> Result<(), TaskError> {
        let entry = self
            .entry(task_id)
            .await
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        let token = CancellationToken::new();

        let snapshot = {
            let mut slot = entry.slot.lock().await;
            if slot.running.is_some() {
                return Err(TaskError::AlreadyExecuting(task_id.to_string()));
            }
            match slot.task.status {
                TaskStatus::Pending | TaskStatus::Paused => {}
                from => {
                    return Err(TaskError::InvalidTransition {
                        from,
                        action: "execute",
                    })
                }
            }
            slot.task.transition(TaskStatus::Running);
            entry.gate.open();
            slot.running = Some(token.clone());
            self.publish(&slot.task).await;
            slot.task.clone()
        };

        tracing::info!(task_id = %task_id, name = %snapshot.name, "Task started");
        let ctx = TaskContext::new(self.clone(), task_id.to_string(), Arc::clone(&entry));
        let mut handle = tokio::spawn(async move { executor.run(snapshot, ctx).await });

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                handle.abort();
                None
            }
            joined = &mut handle => Some(joined),
        };

        // 执行器可能在暂停 / 等待输入期间返回：保留执行中标记，闸门再次打开后才落定结果
        let mut slot = loop {
            let slot = entry.slot.lock().await;
            if !matches!(slot.task.status, TaskStatus::Paused | TaskStatus::WaitingInput) {
                break slot;
            }
            drop(slot);
            tracing::debug!(task_id = %task_id, "executor returned while held, waiting for resume");
            entry.gate.wait_open().await;
        };
        slot.running = None;
        let task = &mut slot.task;

        if task.status == TaskStatus::Cancelled {
            // 取消之后才返回的结果一律丢弃
            task.touch();
            tracing::info!(task_id = %task_id, "Task cancelled");
        } else {
            match outcome {
                Some(Ok(Ok(output))) => {
                    task.output = Some(output);
                    task.transition(TaskStatus::Completed);
                    tracing::info!(task_id = %task_id, "Task completed");
                }
                Some(Ok(Err(err))) if TaskError::is_cancellation(&err) => {
                    task.transition(TaskStatus::Cancelled);
                    tracing::info!(task_id = %task_id, "Task cancelled");
                }
                Some(Ok(Err(err))) => {
                    task.error = Some(err.to_string());
                    task.transition(TaskStatus::Failed);
                    tracing::error!(task_id = %task_id, error = %err, "Task failed");
                }
                Some(Err(join_err)) => {
                    task.error = Some(format!("executor aborted: {}", join_err));
                    task.transition(TaskStatus::Failed);
                    tracing::error!(task_id = %task_id, error = %join_err, "Task executor panicked");
                }
                None => {
                    task.transition(TaskStatus::Cancelled);
                    tracing::info!(task_id = %task_id, "Task cancelled");
                }
            }
        }

        self.publish(&slot.task).await;
        self.persist_snapshot(&slot.task).await;
        Ok(())
    }

    /// 暂停：仅 RUNNING 有效。协作式，执行器在下一个 check_pause 处阻塞
    pub async fn pause(&self, task_id: &str) -> bool {
        let Some(entry) = self.entry(task_id).await else {
            return false;
        };
        let mut slot = entry.slot.lock().await;
        if slot.task.status != TaskStatus::Running {
            return false;
        }
        entry.gate.close();
        slot.task.transition(TaskStatus::Paused);
        self.publish(&slot.task).await;

        tracing::info!(task_id = %task_id, "Task paused");
        true
    }

    /// 恢复：仅 PAUSED 有效
    pub async fn resume(&self, task_id: &str) -> bool {
        let Some(entry) = self.entry(task_id).await else {
            return false;
        };
        let mut slot = entry.slot.lock().await;
        if slot.task.status != TaskStatus::Paused {
            return false;
        }
        entry.gate.open();
        slot.task.transition(TaskStatus::Running);
        self.publish(&slot.task).await;

        tracing::info!(task_id = %task_id, "Task resumed");
        true
    }

    /// 取消：任何非终止状态都可取消；通知正在运行的执行器并打开闸门
    pub async fn cancel(&self, task_id: &str) -> bool {
        let Some(entry) = self.entry(task_id).await else {
            return false;
        };
        let mut slot = entry.slot.lock().await;
        if slot.task.status.is_terminal() {
            return false;
        }
        if let Some(token) = &slot.running {
            token.cancel();
        }
        entry.gate.open();
        slot.task.pending_input_prompt = None;
        slot.task.pending_input_schema = None;
        slot.task.transition(TaskStatus::Cancelled);
        self.publish(&slot.task).await;
        self.persist_snapshot(&slot.task).await;

        tracing::info!(task_id = %task_id, "Task cancelled");
        true
    }

    /// 请求人工输入：仅 RUNNING 有效，进入 WAITING_INPUT 并关闭闸门
    pub async fn request_input(&self, task_id: &str, prompt: impl Into<String>, schema: Option<Value>) -> bool {
        let Some(entry) = self.entry(task_id).await else {
            return false;
        };
        self.request_input_on(&entry, prompt.into(), schema).await.is_ok()
    }

    pub(crate) async fn request_input_on(
        &self,
        entry: &TaskEntry,
        prompt: String,
        schema: Option<Value>,
    ) -> Result<(), TaskError> {
        let mut slot = entry.slot.lock().await;
        let from = slot.task.status;
        if from != TaskStatus::Running {
            return Err(TaskError::InvalidTransition {
                from,
                action: "request input for",
            });
        }
        tracing::info!(task_id = %slot.task.id, prompt = %prompt, "Task waiting for input");
        slot.task.pending_input_prompt = Some(prompt);
        slot.task.pending_input_schema = schema;
        slot.task.user_input = None;
        entry.gate.close();
        slot.task.transition(TaskStatus::WaitingInput);
        self.publish(&slot.task).await;
        Ok(())
    }

    /// 提供人工输入：仅 WAITING_INPUT 有效，回到 RUNNING 并打开闸门
    pub async fn provide_input(&self, task_id: &str, input: Value) -> bool {
        let Some(entry) = self.entry(task_id).await else {
            return false;
        };
        let mut slot = entry.slot.lock().await;
        if slot.task.status != TaskStatus::WaitingInput {
            return false;
        }
        slot.task.user_input = Some(input);
        slot.task.pending_input_prompt = None;
        slot.task.pending_input_schema = None;
        slot.task.transition(TaskStatus::Running);
        entry.gate.open();
        self.publish(&slot.task).await;

        tracing::info!(task_id = %task_id, "Input provided");
        true
    }

    /// 部分更新进度并发布；未知或已终止的任务忽略
    pub async fn update_progress(&self, task_id: &str, update: ProgressUpdate) {
        if let Some(entry) = self.entry(task_id).await {
            self.update_progress_on(&entry, update).await;
        }
    }

    pub(crate) async fn update_progress_on(&self, entry: &TaskEntry, update: ProgressUpdate) {
        let mut slot = entry.slot.lock().await;
        if slot.task.status.is_terminal() {
            tracing::debug!(task_id = %slot.task.id, "progress update ignored for finished task");
            return;
        }
        slot.task.progress.apply(update);
        slot.task.touch();
        tracing::debug!(
            task_id = %slot.task.id,
            step = slot.task.progress.current_step,
            total = slot.task.progress.total_steps,
            "Task progress"
        );
        self.publish(&slot.task).await;
    }

    /// 保存检查点（覆盖）并持久化，进程重启后仍可按 ID 取回
    pub async fn checkpoint(&self, task_id: &str, data: Value) {
        if let Some(entry) = self.entry(task_id).await {
            self.checkpoint_on(&entry, data).await;
        }
    }

    pub(crate) async fn checkpoint_on(&self, entry: &TaskEntry, data: Value) {
        let mut slot = entry.slot.lock().await;
        let key = checkpoint_key(&slot.task.id);
        if let Err(e) = self.inner.cache.set(&key, &data, self.inner.snapshot_ttl).await {
            tracing::warn!(task_id = %slot.task.id, error = %e, "failed to persist checkpoint");
        }
        slot.task.checkpoint_data = Some(data);
        tracing::debug!(task_id = %slot.task.id, "Checkpoint saved");
    }

    /// 从缓存读取检查点（不依赖内存注册表）
    pub async fn load_checkpoint(&self, task_id: &str) -> Option<Value> {
        match self.inner.cache.get(&checkpoint_key(task_id)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "failed to load checkpoint");
                None
            }
        }
    }

    /// 从缓存读取任务快照
    pub async fn load_snapshot(&self, task_id: &str) -> Option<Task> {
        let value = match self.inner.cache.get(&snapshot_key(task_id)).await {
            Ok(value) => value?,
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "failed to load task snapshot");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "corrupt task snapshot");
                None
            }
        }
    }

    /// 按条件列出任务，最新创建的在前
    pub async fn list(&self, filter: &TaskFilter) -> Vec<Task> {
        let entries: Vec<Arc<TaskEntry>> = self.inner.tasks.read().await.values().cloned().collect();

        let mut matched = Vec::with_capacity(entries.len());
        for entry in entries {
            let slot = entry.slot.lock().await;
            if filter.matches(&slot.task) {
                matched.push((entry.seq, slot.task.clone()));
            }
        }
        matched.sort_by(|(seq_a, a), (seq_b, b)| b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a)));
        matched.into_iter().map(|(_, task)| task).collect()
    }

    /// 删除已终止的任务及其闸门，并关闭更新通道
    pub async fn delete(&self, task_id: &str) -> Result<Task, TaskError> {
        let mut tasks = self.inner.tasks.write().await;
        let entry = tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        let slot = entry.slot.lock().await;
        if !slot.task.status.is_terminal() {
            return Err(TaskError::InvalidTransition {
                from: slot.task.status,
                action: "delete",
            });
        }
        tasks.remove(task_id);
        drop(tasks);

        self.inner.pubsub.close(&task_channel(task_id)).await;
        tracing::info!(task_id = %task_id, "Task deleted");
        Ok(slot.task.clone())
    }

    /// 注册表中的任务数
    pub async fn len(&self) -> usize {
        self.inner.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.tasks.read().await.is_empty()
    }

    /// 正在运行执行器的任务数
    pub async fn executing_count(&self) -> usize {
        let entries: Vec<Arc<TaskEntry>> = self.inner.tasks.read().await.values().cloned().collect();
        let mut count = 0;
        for entry in entries {
            if entry.slot.lock().await.running.is_some() {
                count += 1;
            }
        }
        count
    }

    async fn publish(&self, task: &Task) {
        let message = match serde_json::to_value(task.view()) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "failed to serialize task update");
                return;
            }
        };
        if let Err(e) = self.inner.pubsub.publish(&task_channel(&task.id), &message).await {
            tracing::warn!(task_id = %task.id, error = %e, "failed to publish task update");
        }
    }

    async fn persist_snapshot(&self, task: &Task) {
        let value = match serde_json::to_value(task) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "failed to serialize task snapshot");
                return;
            }
        };
        if let Err(e) = self
            .inner
            .cache
            .set(&snapshot_key(&task.id), &value, self.inner.snapshot_ttl)
            .await
        {
            tracing::warn!(task_id = %task.id, error = %e, "failed to persist task snapshot");
        }
    }
}

fn snapshot_key(task_id: &str) -> String {
    format!("task:{}", task_id)
}

fn checkpoint_key(task_id: &str) -> String {
    format!("checkpoint:{}", task_id)
}
