use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::pipeline::{AnalysisRequest, Analyzer};

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
}

impl AppState {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/v1/status", get(status))
        .route("/v1/items/analyze", post(analyze))
        .route("/v1/items/{id}", get(get_item))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct AnalyzeReq {
    query: String,
}

#[derive(Serialize)]
struct StatusResp {
    status: &'static str,
    message: &'static str,
    version: &'static str,
}

async fn status() -> Json<StatusResp> {
    Json(StatusResp {
        status: "ok",
        message: "API is running smoothly",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// HTTP status mirrors the `status` field of the body.
async fn analyze(State(state): State<AppState>, Json(body): Json<AnalyzeReq>) -> Response {
    let req = AnalysisRequest {
        id: Uuid::new_v4().to_string(),
        raw: body.query,
    };
    let resp = state.analyzer.analyze(req).await;
    info!(request_id = resp.id(), status = resp.status(), "analyze handled");
    let code = StatusCode::from_u16(resp.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(resp)).into_response()
}

async fn get_item(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.analyzer.fetch(&id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": 404, "id": id, "error": "Analysis not found." })),
        )
            .into_response(),
        Err(e) => {
            error!(%id, error = %e, "failed to load analysis result");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": 500, "id": id, "error": "Failed to load analysis result." })),
            )
                .into_response()
        }
    }
}
