//! 任务管理错误
//!
//! 便捷操作（pause / resume / cancel / provide_input）对“未找到”与“非法转换”返回 `false`；
//! `get` / `execute` / `delete` 通过 [`TaskError`] 显式报告。

use thiserror::Error;

use super::task::TaskStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Cannot {action} task in status {from}")]
    InvalidTransition { from: TaskStatus, action: &'static str },

    #[error("Task is already executing: {0}")]
    AlreadyExecuting(String),

    /// 执行器在挂起点观察到任务已被取消
    #[error("Task was cancelled")]
    Cancelled,
}

impl TaskError {
    /// 执行器返回的错误链中是否包含取消信号
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        err.chain()
            .any(|cause| matches!(cause.downcast_ref::<TaskError>(), Some(TaskError::Cancelled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = TaskError::InvalidTransition {
            from: TaskStatus::Completed,
            action: "execute",
        };
        assert_eq!(err.to_string(), "Cannot execute task in status completed");
        assert_eq!(TaskError::NotFound("t1".into()).to_string(), "Task not found: t1");
    }

    #[test]
    fn test_cancellation_detected_through_context() {
        let err = anyhow::Error::new(TaskError::Cancelled).context("while analysing clause 3");
        assert!(TaskError::is_cancellation(&err));
        assert!(!TaskError::is_cancellation(&anyhow::anyhow!("LLM timeout")));
    }
}
