//! 长任务生命周期集成测试：只使用公开 API

use std::time::Duration;

use contractguard::broker::is_terminal_update;
use contractguard::core::{executor_fn, ProgressUpdate, Task, TaskContext, TaskManager, TaskStatus};
use serde_json::{json, Value};

async fn wait_for(manager: &TaskManager, id: &str, status: TaskStatus) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while manager.get(id).await.unwrap().status != status {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {} never reached {}", id, status));
}

async fn one_step(_task: Task, ctx: TaskContext) -> anyhow::Result<Value> {
    ctx.update_progress(ProgressUpdate::step(1, 4, "step1")).await;
    ctx.check_pause().await?;
    Ok(json!({"result": "ok"}))
}

#[tokio::test]
async fn test_execute_to_completion_publishes_every_transition() {
    let manager = TaskManager::in_memory(32);
    let task = manager.create("analysis", json!({"document_id": "d1"}), None, None).await;
    assert_eq!(task.status, TaskStatus::Pending);

    let mut updates = manager.subscribe(&task.id).await.unwrap();
    manager.execute(&task.id, executor_fn(one_step)).await.unwrap();

    let mut seen = Vec::new();
    while let Some(update) = updates.recv().await {
        let terminal = is_terminal_update(&update);
        seen.push(update);
        if terminal {
            break;
        }
    }
    let statuses: Vec<&str> = seen.iter().map(|u| u["status"].as_str().unwrap()).collect();
    assert_eq!(statuses, vec!["running", "running", "completed"]);
    assert_eq!(seen[1]["progress"]["percentage"], 25.0);
    assert_eq!(seen[1]["progress"]["message"], "step1");

    let done = manager.get(&task.id).await.unwrap();
    assert_eq!(done.output, Some(json!({"result": "ok"})));
    assert!(done.error.is_none());
    assert!(done.started_at.unwrap() <= done.completed_at.unwrap());
    assert!(done.created_at <= done.updated_at);
}

async fn looping(_task: Task, ctx: TaskContext) -> anyhow::Result<Value> {
    let mut step = 0;
    loop {
        ctx.check_pause().await?;
        step += 1;
        ctx.update_progress(ProgressUpdate::message(format!("iteration {}", step))).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_pause_then_cancel() {
    let manager = TaskManager::in_memory(256);
    let task = manager.create("analysis", json!({}), None, None).await;
    let runner = {
        let manager = manager.clone();
        let id = task.id.clone();
        tokio::spawn(async move { manager.execute(&id, executor_fn(looping)).await })
    };
    wait_for(&manager, &task.id, TaskStatus::Running).await;

    assert!(manager.pause(&task.id).await);
    assert!(!manager.pause(&task.id).await);
    assert_eq!(manager.get(&task.id).await.unwrap().status, TaskStatus::Paused);

    assert!(manager.cancel(&task.id).await);
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("cancel must unblock the executor")
        .unwrap()
        .unwrap();

    let cancelled = manager.get(&task.id).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert!(cancelled.output.is_none() && cancelled.error.is_none());
    assert!(!manager.cancel(&task.id).await);
}

#[tokio::test]
async fn test_pause_and_resume_continue_execution() {
    let manager = TaskManager::in_memory(256);
    let task = manager.create("analysis", json!({}), None, None).await;
    let exec = executor_fn(|_task: Task, ctx: TaskContext| async move {
        for i in 1..=20u32 {
            ctx.check_pause().await?;
            ctx.update_progress(ProgressUpdate::step(i, 20, "working")).await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        Ok::<Value, anyhow::Error>(json!("done"))
    });
    let runner = {
        let manager = manager.clone();
        let id = task.id.clone();
        tokio::spawn(async move { manager.execute(&id, exec).await })
    };
    wait_for(&manager, &task.id, TaskStatus::Running).await;

    assert!(manager.pause(&task.id).await);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let frozen = manager.get(&task.id).await.unwrap().progress.current_step;
    tokio::time::sleep(Duration::from_millis(30)).await;
    // 暂停期间至多完成暂停前已越过检查点的那一步
    assert!(manager.get(&task.id).await.unwrap().progress.current_step <= frozen + 1);

    assert!(manager.resume(&task.id).await);
    runner.await.unwrap().unwrap();
    let done = manager.get(&task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.progress.percentage, 100.0);
}

async fn ask_category(_task: Task, ctx: TaskContext) -> anyhow::Result<Value> {
    let choice = ctx
        .request_input("Pick a category", Some(json!({"type": "string"})))
        .await?;
    Ok(json!({ "category": choice }))
}

#[tokio::test]
async fn test_human_input_round_trip() {
    let manager = TaskManager::in_memory(32);
    let task = manager.create("risk_analysis", json!({}), Some("u1".into()), None).await;
    let runner = {
        let manager = manager.clone();
        let id = task.id.clone();
        tokio::spawn(async move { manager.execute(&id, executor_fn(ask_category)).await })
    };
    wait_for(&manager, &task.id, TaskStatus::WaitingInput).await;

    let waiting = manager.get(&task.id).await.unwrap();
    assert_eq!(waiting.pending_input_prompt.as_deref(), Some("Pick a category"));
    assert_eq!(waiting.pending_input_schema, Some(json!({"type": "string"})));
    assert!(!manager.pause(&task.id).await);

    assert!(manager.provide_input(&task.id, json!("financial")).await);
    let resumed = manager.get(&task.id).await.unwrap();
    assert!(resumed.pending_input_prompt.is_none());
    assert!(resumed.pending_input_schema.is_none());

    runner.await.unwrap().unwrap();
    let done = manager.get(&task.id).await.unwrap();
    assert_eq!(done.output, Some(json!({"category": "financial"})));
}

#[tokio::test]
async fn test_provide_input_while_running_is_rejected() {
    let manager = TaskManager::in_memory(256);
    let task = manager.create("analysis", json!({}), None, None).await;
    let runner = {
        let manager = manager.clone();
        let id = task.id.clone();
        tokio::spawn(async move { manager.execute(&id, executor_fn(looping)).await })
    };
    wait_for(&manager, &task.id, TaskStatus::Running).await;

    assert!(!manager.provide_input(&task.id, json!("late")).await);
    let still = manager.get(&task.id).await.unwrap();
    assert_eq!(still.status, TaskStatus::Running);
    assert!(still.user_input.is_none());

    manager.cancel(&task.id).await;
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failure_is_recorded() {
    let manager = TaskManager::in_memory(32);
    let task = manager.create("compare", json!({}), None, None).await;
    let exec = executor_fn(|_task: Task, _ctx: TaskContext| async move {
        Err::<Value, anyhow::Error>(anyhow::anyhow!("vector store unreachable"))
    });
    manager.execute(&task.id, exec).await.unwrap();

    let failed = manager.get(&task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("vector store unreachable"));
    assert!(failed.output.is_none());
    assert!(failed.completed_at.is_some());
}

#[tokio::test]
async fn test_snapshot_and_checkpoint_survive_delete() {
    let manager = TaskManager::in_memory(32);
    let task = manager.create("report", json!({}), None, None).await;
    let exec = executor_fn(|_task: Task, ctx: TaskContext| async move {
        ctx.checkpoint(json!({"pages_done": 3})).await;
        Ok::<Value, anyhow::Error>(json!("ok"))
    });
    manager.execute(&task.id, exec).await.unwrap();

    let deleted = manager.delete(&task.id).await.unwrap();
    assert_eq!(deleted.status, TaskStatus::Completed);
    assert!(manager.get(&task.id).await.is_err());

    let snapshot = manager.load_snapshot(&task.id).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Completed);
    assert_eq!(manager.load_checkpoint(&task.id).await, Some(json!({"pages_done": 3})));
}
