use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use serde_json::Value;

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check handler
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "OK" })
}

/// Tool schemas advertised to the realtime service, in registration order.
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Vec<Value>> {
    Json(
        state
            .tools
            .schemas()
            .into_iter()
            .map(|tool| tool.schema)
            .collect(),
    )
}

/// Schema of a single tool.
pub async fn get_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    let tool = state
        .tools
        .resolve(&name)
        .map_err(|_| AppError::NotFound(format!("tool '{name}'")))?;
    Ok(Json(tool.schema().clone()))
}
