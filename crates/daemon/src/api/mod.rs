use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::orchestrator::Orchestrator;

pub mod callbacks;
pub mod compositions;
pub mod jobs;

pub fn router(db: Arc<Database>, orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .nest("/jobs", jobs::router(orchestrator.clone()))
        .nest(
            "/compositions",
            compositions::router(db.clone(), orchestrator.clone()),
        )
        .nest("/edits", compositions::edits_router(orchestrator.clone()))
        .nest("/callbacks", callbacks::router(orchestrator))
}
