//! 文档分块接口 `/api/v1/documents/chunk`

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::chunking::{Chunk, ChunkingConfig, ClauseChunker, PageText};

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/v1/documents/chunk", post(chunk_document))
}

#[derive(Debug, Deserialize)]
struct PageInput {
    page_number: u32,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChunkRequest {
    document_id: Option<String>,
    #[serde(default)]
    document_name: String,
    text: Option<String>,
    pages: Option<Vec<PageInput>>,
    /// 覆盖服务端默认的分块参数
    config: Option<ChunkingConfig>,
}

#[derive(Debug, Serialize)]
struct ChunkResponse {
    document_id: String,
    total_chunks: usize,
    chunks: Vec<Chunk>,
}

/// POST /api/v1/documents/chunk：`text` 与 `pages` 二选一
async fn chunk_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChunkRequest>,
) -> Result<Json<ChunkResponse>, ApiError> {
    let document_id = req
        .document_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let custom;
    let chunker: &ClauseChunker = match req.config {
        Some(config) => {
            custom = ClauseChunker::new(config);
            &custom
        }
        None => state.chunker.as_ref(),
    };

    let chunks = match (req.text, req.pages) {
        (Some(text), None) => chunker.chunk(&text, &document_id, &req.document_name),
        (None, Some(pages)) => {
            let pages: Vec<PageText<'_>> = pages
                .iter()
                .map(|p| PageText {
                    page_number: p.page_number,
                    text: &p.text,
                })
                .collect();
            chunker.chunk_pages(&pages, &document_id, &req.document_name)
        }
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "exactly one of text or pages is required".to_string(),
            ))
        }
    };

    tracing::info!(document_id = %document_id, chunks = chunks.len(), "document chunked");
    Ok(Json(ChunkResponse {
        document_id,
        total_chunks: chunks.len(),
        chunks,
    }))
}
