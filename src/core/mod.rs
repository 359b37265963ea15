//! 核心层：长任务状态机、暂停闸门、执行器上下文

pub mod context;
pub mod error;
pub mod gate;
pub mod manager;
pub mod task;

pub use context::TaskContext;
pub use error::TaskError;
pub use gate::PauseGate;
pub use manager::{executor_fn, TaskExecutor, TaskFilter, TaskManager, DEFAULT_SNAPSHOT_TTL};
pub use task::{ProgressUpdate, ProgressView, Task, TaskId, TaskProgress, TaskStatus, TaskView};
