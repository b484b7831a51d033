use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use engine::timeline::ComposedTimeline;

use crate::db::Database;
use crate::error::EditError;
use crate::orchestrator::edits::EditOutcome;
use crate::orchestrator::Orchestrator;

#[derive(Serialize)]
pub struct CompositionResponse {
    id: i64,
    job_id: i64,
    output_ref: Option<String>,
    timeline: ComposedTimeline,
}

#[derive(Deserialize)]
pub struct SubmitEditRequest {
    instruction: String,
    #[serde(default)]
    apply_immediately: bool,
}

pub fn router(db: Arc<Database>, orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/:id", get(get_composition))
        .route("/:id/edits", post(submit_edit))
        .with_state((db, orchestrator))
}

pub fn edits_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/:id/confirm", post(confirm_edit))
        .with_state(orchestrator)
}

fn edit_error_response(e: EditError) -> (StatusCode, String) {
    let status = match &e {
        EditError::UnknownComposition(_) | EditError::UnknownEdit(_) => StatusCode::NOT_FOUND,
        EditError::NotPending(_) => StatusCode::CONFLICT,
        EditError::OutOfRange { .. } | EditError::Malformed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EditError::Interpreter(_) | EditError::Recompose(_) => StatusCode::BAD_GATEWAY,
        EditError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

async fn get_composition(
    State((db, _orchestrator)): State<(Arc<Database>, Arc<Orchestrator>)>,
    Path(id): Path<i64>,
) -> Result<Json<CompositionResponse>, StatusCode> {
    let composition = db
        .get_composition(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let timeline: ComposedTimeline = serde_json::from_str(&composition.timeline_json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(CompositionResponse {
        id: composition.id,
        job_id: composition.job_id,
        output_ref: composition.output_ref,
        timeline,
    }))
}

async fn submit_edit(
    State((_db, orchestrator)): State<(Arc<Database>, Arc<Orchestrator>)>,
    Path(id): Path<i64>,
    Json(req): Json<SubmitEditRequest>,
) -> Result<Json<EditOutcome>, (StatusCode, String)> {
    orchestrator
        .submit_edit(id, &req.instruction, req.apply_immediately)
        .await
        .map(Json)
        .map_err(edit_error_response)
}

async fn confirm_edit(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<i64>,
) -> Result<Json<EditOutcome>, (StatusCode, String)> {
    orchestrator
        .confirm_edit(id)
        .await
        .map(Json)
        .map_err(edit_error_response)
}
