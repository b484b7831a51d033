use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, level_filters::LevelFilter};

mod api;
mod composer;
mod config;
mod consistency;
mod coordinator;
mod db;
mod error;
mod interpreter;
mod orchestrator;
mod planner;
mod renderer;
mod retry;

use crate::composer::HttpComposer;
use crate::interpreter::HttpInterpreterGateway;
use crate::renderer::HttpRenderer;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    let config = config::Config::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(db::Database::new(&config.db_path)?);
    info!("database initialized at {:?}", config.db_path);

    // External capabilities, injected at construction so the orchestration
    // core stays deterministic behind these seams.
    let interpreter = Arc::new(HttpInterpreterGateway::new(
        config.interpreter_url.clone(),
        config.interpreter_timeout,
    ));
    let renderer = Arc::new(HttpRenderer::new(config.renderer_url.clone()));
    let composer = Arc::new(HttpComposer::new(config.composer_url.clone()));

    let orchestrator =
        orchestrator::Orchestrator::new(db.clone(), &config, interpreter, renderer, composer);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .nest("/api", api::router(db, orchestrator))
        .layer(cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("starting daemon server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
