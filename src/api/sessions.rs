//! 会话接口 `/api/v1/sessions`

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{ApiError, AppState};
use crate::session::{AgentContext, Role, SessionContext};

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/sessions", post(create_session))
        .route("/api/v1/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/v1/sessions/:id/messages", post(add_message))
        .route("/api/v1/sessions/:id/history", get(get_history))
        .route("/api/v1/sessions/:id/documents", put(set_documents))
        .route("/api/v1/sessions/:id/context", put(update_context))
        .route("/api/v1/sessions/:id/agent-context", get(agent_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateSessionRequest {
    user_id: Option<String>,
    active_documents: Vec<String>,
    context: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AddMessageRequest {
    role: Role,
    content: String,
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    max_turns: Option<usize>,
    #[serde(default = "default_true")]
    include_history: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct DocumentsRequest {
    document_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ContextUpdateRequest {
    key: String,
    value: Value,
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, "Session not found".to_string())
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Json<SessionContext> {
    Json(
        state
            .sessions
            .create(req.user_id, req.active_documents, req.context)
            .await,
    )
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionContext>, ApiError> {
    state.sessions.get(&session_id).await.map(Json).ok_or_else(not_found)
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.sessions.delete(&session_id).await {
        return Err(not_found());
    }
    Ok(Json(json!({ "message": "Session deleted", "session_id": session_id })))
}

async fn add_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<AddMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    if !state
        .sessions
        .add_message(&session_id, req.role, &req.content, req.metadata)
        .await
    {
        return Err(not_found());
    }
    Ok(Json(json!({ "message": "Message added", "session_id": session_id })))
}

/// GET /api/v1/sessions/:id/history?max_turns=
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    if state.sessions.get(&session_id).await.is_none() {
        return Err(not_found());
    }
    let max_turns = query.max_turns.unwrap_or(state.config.session.max_history_turns);
    let turns = state.sessions.get_history(&session_id, max_turns).await;
    Ok(Json(json!({
        "session_id": session_id,
        "count": turns.len(),
        "turns": turns,
    })))
}

async fn set_documents(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<DocumentsRequest>,
) -> Result<Json<Value>, ApiError> {
    if !state.sessions.set_active_documents(&session_id, req.document_ids).await {
        return Err(not_found());
    }
    Ok(Json(json!({ "message": "Active documents updated", "session_id": session_id })))
}

async fn update_context(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<ContextUpdateRequest>,
) -> Result<Json<Value>, ApiError> {
    if !state.sessions.update_context(&session_id, &req.key, req.value).await {
        return Err(not_found());
    }
    Ok(Json(json!({ "message": "Context updated", "session_id": session_id })))
}

/// GET /api/v1/sessions/:id/agent-context?include_history=&max_turns=
async fn agent_context(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<AgentContext>, ApiError> {
    let max_turns = query.max_turns.unwrap_or(state.config.session.max_history_turns);
    state
        .sessions
        .get_context_for_agent(&session_id, query.include_history, max_turns)
        .await
        .map(Json)
        .ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use axum::http::Method;

    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (_state, app) = app();
        let created = json_body(
            send(
                &app,
                Method::POST,
                "/api/v1/sessions",
                Some(json!({"user_id": "u1", "active_documents": ["nda"]})),
            )
            .await,
        )
        .await;
        let id = created["session_id"].as_str().unwrap();
        let base = format!("/api/v1/sessions/{}", id);

        for (role, content) in [("user", "What is the term?"), ("assistant", "Two years.")] {
            let response = send(
                &app,
                Method::POST,
                &format!("{}/messages", base),
                Some(json!({"role": role, "content": content})),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let history = json_body(send(&app, Method::GET, &format!("{}/history?max_turns=1", base), None).await).await;
        assert_eq!(history["count"], 1);
        assert_eq!(history["turns"][0]["role"], "assistant");

        send(&app, Method::PUT, &format!("{}/context", base), Some(json!({"key": "focus", "value": "term"}))).await;
        send(&app, Method::PUT, &format!("{}/documents", base), Some(json!({"document_ids": ["msa"]}))).await;

        let ctx = json_body(send(&app, Method::GET, &format!("{}/agent-context", base), None).await).await;
        assert_eq!(ctx["active_documents"], json!(["msa"]));
        assert_eq!(ctx["context"]["focus"], "term");
        assert_eq!(ctx["conversation_history"], "User: What is the term?\n\nAssistant: Two years.");

        let bare = json_body(
            send(&app, Method::GET, &format!("{}/agent-context?include_history=false", base), None).await,
        )
        .await;
        assert!(bare.get("conversation_history").is_none());

        assert_eq!(send(&app, Method::DELETE, &base, None).await.status(), StatusCode::OK);
        assert_eq!(send(&app, Method::GET, &base, None).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_session_is_404() {
        let (_state, app) = app();
        let response = send(
            &app,
            Method::POST,
            "/api/v1/sessions/nope/messages",
            Some(json!({"role": "user", "content": "hi"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(text_body(response).await, "Session not found");

        let response = send(&app, Method::GET, "/api/v1/sessions/nope/history", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_session_feeds_skill_task() {
        let (state, app) = app();
        let session = json_body(send(&app, Method::POST, "/api/v1/sessions", Some(json!({}))).await).await;
        let session_id = session["session_id"].as_str().unwrap();

        let task = json_body(
            send(
                &app,
                Method::POST,
                "/api/v1/tasks",
                Some(json!({"name": "risk_analysis", "session_id": session_id, "input_data": {"document_id": "d1"}})),
            )
            .await,
        )
        .await;
        let task_id = task["id"].as_str().unwrap();
        send(&app, Method::POST, &format!("/api/v1/tasks/{}/execute", task_id), None).await;

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while !state.tasks.get(task_id).await.unwrap().is_finished() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task did not finish");

        let history = state.sessions.get_history(session_id, 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].metadata["task_id"], json!(task_id));
    }
}
