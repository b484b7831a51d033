use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use serde::Deserialize;
use std::sync::Arc;

use crate::orchestrator::Orchestrator;

/// Completion events from the composition capability. The only inbound
/// signal besides the public API.
#[derive(Deserialize)]
pub struct CompositionCallback {
    job_id: i64,
    status: String,
    output_ref: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct RecompositionCallback {
    edit_id: i64,
    status: String,
    output_ref: Option<String>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/composition", post(composition_complete))
        .route("/recomposition", post(recomposition_complete))
        .with_state(orchestrator)
}

async fn composition_complete(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(callback): Json<CompositionCallback>,
) -> Result<Json<()>, StatusCode> {
    orchestrator
        .handle_composition_result(
            callback.job_id,
            callback.status == "succeeded",
            callback.output_ref.as_deref(),
            callback.error.as_deref(),
        )
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(()))
}

async fn recomposition_complete(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(callback): Json<RecompositionCallback>,
) -> Result<Json<()>, StatusCode> {
    orchestrator
        .handle_recomposition_result(
            callback.edit_id,
            callback.status == "succeeded",
            callback.output_ref.as_deref(),
        )
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(()))
}
