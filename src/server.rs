use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::comment::{CommentRequest, InboundComment};
use crate::orchestrator::CommentOrchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CommentOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: CommentOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/process-comment", post(process_comment))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// The only error boundary: anything the pipeline did not absorb becomes a
/// 500 carrying the error message.
async fn process_comment(
    State(state): State<AppState>,
    Json(body): Json<CommentRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let comment = InboundComment::from(body);

    let result = state
        .orchestrator
        .process(&comment)
        .instrument(info_span!("process_comment", %request_id))
        .await;

    match result {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(e) => {
            error!(%request_id, "Error: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: format!("{:#}", e),
                }),
            )
                .into_response()
        }
    }
}

/// Serve until Ctrl-C, then close pooled browsers.
pub async fn run(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server running on port {}", port);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    state.orchestrator.poster().pool().shutdown().await;
    Ok(())
}
