//! 暂停闸门：打开时立即放行，关闭时阻塞到再次打开

use tokio::sync::watch;

/// 每个任务一个闸门，随任务注册创建、随任务删除销毁
#[derive(Debug)]
pub struct PauseGate {
    tx: watch::Sender<bool>,
}

impl PauseGate {
    /// 新闸门默认打开
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn close(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// 等待闸门打开；已打开时立即返回
    pub async fn wait_open(&self) {
        let mut rx = self.tx.subscribe();
        // 发送端由闸门自身持有，不会先于等待者关闭
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_gate_passes_immediately() {
        let gate = PauseGate::new();
        assert!(gate.is_open());
        tokio::time::timeout(Duration::from_millis(50), gate.wait_open())
            .await
            .expect("open gate should not block");
    }

    #[tokio::test]
    async fn test_closed_gate_blocks_until_opened() {
        let gate = Arc::new(PauseGate::new());
        gate.close();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_open().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.open();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be released")
            .unwrap();
    }

    #[tokio::test]
    async fn test_reopen_before_wait_is_not_lost() {
        let gate = PauseGate::new();
        gate.close();
        gate.open();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_open())
            .await
            .expect("gate already open");
    }
}
