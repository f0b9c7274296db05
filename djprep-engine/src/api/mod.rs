//! HTTP API handlers: one module per resource, aggregated into a single
//! router by `routes()`.

pub mod export;
pub mod health;
pub mod jobs;
pub mod plan;
pub mod scan;
pub mod similarity;
pub mod tracks;

use crate::AppState;
use axum::routing::{get, post, put};
use axum::Router;

/// Every endpoint versioned under `/api/v1`. `/healthz` is mounted
/// separately, at the root, by `crate::build_router`.
pub fn v1_routes() -> Router<AppState> {
    Router::new()
        .route("/scan", post(scan::scan))
        .route("/tracks", get(tracks::list))
        .route("/tracks/:content_hash", get(tracks::get))
        .route("/tracks/:content_hash/cues", get(tracks::list_cues))
        .route(
            "/tracks/:content_hash/cues/:cue_index",
            put(tracks::put_cue_edit),
        )
        .route("/analyze", post(jobs::analyze))
        .route("/jobs/:job_id", get(jobs::get))
        .route("/jobs/:job_id/cancel", post(jobs::cancel))
        .route("/jobs/stream", get(jobs::stream))
        .route("/plan", post(plan::plan))
        .route("/export", post(export::export))
        .route("/similarity/:content_hash", get(similarity::list))
}
