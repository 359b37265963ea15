//! WebSocket 任务更新推送 `/ws/task/:id`
//!
//! 连接后先发送 `connected` 帧，然后逐条转发更新通道中的任务快照，
//! 收到终止状态的快照后关闭连接。

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::{json, Value};

use super::AppState;
use crate::broker::is_terminal_update;

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws/task/:id", get(task_updates))
}

async fn task_updates(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| bridge(socket, state, task_id))
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, value: &Value) -> bool {
    sender.send(Message::Text(value.to_string())).await.is_ok()
}

async fn bridge(socket: WebSocket, state: Arc<AppState>, task_id: String) {
    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = state.tasks.get(&task_id).await {
        send_json(&mut sender, &json!({"type": "error", "message": e.to_string()})).await;
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    // 订阅之后再读取当前状态，避免错过两者之间的终止更新
    let mut subscription = match state.tasks.subscribe(&task_id).await {
        Ok(sub) => sub,
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "cannot subscribe to task updates");
            send_json(&mut sender, &json!({"type": "error", "message": e.to_string()})).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    let current = match state.tasks.get(&task_id).await {
        Ok(task) => task,
        Err(e) => {
            send_json(&mut sender, &json!({"type": "error", "message": e.to_string()})).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    tracing::info!(task_id = %task_id, "WebSocket connected");
    let connected = json!({
        "type": "connected",
        "task_id": task_id,
        "message": format!("Connected to updates for task {}", task_id),
    });
    if !send_json(&mut sender, &connected).await {
        return;
    }

    if current.is_finished() {
        // 已结束的任务不会再有更新，直接补发最终快照
        if let Ok(snapshot) = serde_json::to_value(current.view()) {
            send_json(&mut sender, &snapshot).await;
        }
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            update = subscription.recv() => match update {
                Some(update) => {
                    if !send_json(&mut sender, &update).await {
                        break;
                    }
                    if is_terminal_update(&update) {
                        break;
                    }
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    tracing::info!(task_id = %task_id, "Client disconnected");
                    return;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    tracing::debug!(task_id = %task_id, "WebSocket closed");
}
