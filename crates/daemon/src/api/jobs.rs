use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;

use engine::plan::PipelineKind;
use engine::style::BrandConfig;

use crate::error::SubmitError;
use crate::orchestrator::{JobSnapshot, Orchestrator, SubmitRequest};
use crate::planner::TimingHints;

#[derive(Deserialize)]
pub struct SubmitJobRequest {
    kind: PipelineKind,
    prompt: String,
    duration_secs: u32,
    aspect_ratio: Option<String>,
    brand: Option<BrandConfig>,
    audio_ref: Option<String>,
    timing_hints: Option<TimingHints>,
}

#[derive(Serialize)]
pub struct SubmitJobResponse {
    job_id: i64,
}

#[derive(Serialize)]
pub struct CancelResponse {
    cancelled: bool,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/", post(submit_job))
        .route("/:id", get(get_job))
        .route("/:id/events", get(job_events))
        .route("/:id/cancel", post(cancel_job))
        .with_state(orchestrator)
}

async fn submit_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<Json<SubmitJobResponse>, (StatusCode, String)> {
    let request = SubmitRequest {
        kind: req.kind,
        prompt: req.prompt,
        duration_secs: req.duration_secs,
        aspect_ratio: req.aspect_ratio.unwrap_or_else(|| "16:9".to_string()),
        brand: req.brand,
        audio_ref: req.audio_ref,
        timing_hints: req.timing_hints,
    };
    match orchestrator.submit(request) {
        Ok(job_id) => Ok(Json(SubmitJobResponse { job_id })),
        Err(SubmitError::Validation(e)) => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
        Err(SubmitError::Internal(e)) => {
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn get_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<i64>,
) -> Result<Json<JobSnapshot>, StatusCode> {
    orchestrator
        .get_status(id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// SSE stream of job snapshots, ending after the terminal snapshot.
async fn job_events(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    if orchestrator.get_status(id).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let ticks = IntervalStream::new(tokio::time::interval(Duration::from_millis(500)));
    let stream = ticks
        .scan(false, move |done, _| {
            let next = if *done {
                None
            } else {
                orchestrator.get_status(id).map(|snapshot| {
                    *done = snapshot.stage.is_terminal();
                    snapshot
                })
            };
            futures::future::ready(next)
        })
        .filter_map(|snapshot| {
            futures::future::ready(
                Event::default()
                    .json_data(&snapshot)
                    .ok()
                    .map(Ok::<_, Infallible>),
            )
        });

    Ok(Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default()))
}

async fn cancel_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<i64>,
) -> Result<Json<CancelResponse>, StatusCode> {
    if orchestrator.get_status(id).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    let cancelled = orchestrator.cancel(id);
    Ok(Json(CancelResponse { cancelled }))
}
