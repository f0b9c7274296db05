//! `/analyze`, `/jobs/:id`, and the job-event SSE stream.

use crate::db::jobs;
use crate::error::EngineError;
use crate::model::JobPriority;
use crate::{AppState, EngineResult};
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub content_hash: String,
    #[serde(default)]
    pub version: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub job_id: Uuid,
}

/// Submits an explicit re-analyze request; `version` defaults to one
/// past the track's latest complete Analysis.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> EngineResult<Json<AnalyzeResponse>> {
    let version = match request.version {
        Some(v) => v,
        None => {
            let latest = crate::db::analyses::latest_complete(&state.pool, &request.content_hash)
                .await?;
            latest.map(|a| a.version + 1).unwrap_or(1)
        }
    };

    let job_id = state
        .scheduler
        .submit(&request.content_hash, version, JobPriority::ExplicitReanalyze)
        .await?;
    Ok(Json(AnalyzeResponse { job_id }))
}

pub async fn get(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> EngineResult<Json<jobs::JobRow>> {
    let job = jobs::get_job(&state.pool, job_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
    Ok(Json(job))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> EngineResult<Json<serde_json::Value>> {
    state.scheduler.cancel(job_id).await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

/// Streams every `JobEvent` emitted after subscription as a server-sent
/// event; a client reconnects to pick up from "now" rather than replay
/// history.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.scheduler.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    yield Ok(Event::default().comment("heartbeat"));
                }
                recv = rx.recv() => {
                    match recv {
                        Ok(event) => match serde_json::to_string(&event) {
                            Ok(payload) => yield Ok(Event::default().data(payload)),
                            Err(e) => debug!("failed to serialize job event: {e}"),
                        },
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            debug!("job event stream dropped {n} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
