//! `/tracks` and its cue-edit sub-resource.

use crate::db::{analyses, cue_edits, tracks};
use crate::error::EngineError;
use crate::model::{CueEdit, CuePoint, Track};
use crate::{AppState, EngineResult};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Default)]
pub struct ListTracksQuery {
    pub query: Option<String>,
    pub key: Option<String>,
    pub bpm_min: Option<f64>,
    pub bpm_max: Option<f64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListTracksQuery>,
) -> EngineResult<Json<Vec<Track>>> {
    let filter = tracks::TrackFilter {
        query: params.query,
        key: params.key,
        bpm_min: params.bpm_min,
        bpm_max: params.bpm_max,
        limit: params.limit.unwrap_or(100),
        offset: params.offset.unwrap_or(0),
    };
    let rows = tracks::list_tracks(&state.pool, &filter).await?;
    Ok(Json(rows))
}

pub async fn get(
    State(state): State<AppState>,
    Path(content_hash): Path<String>,
) -> EngineResult<Json<Track>> {
    let track = tracks::get_track(&state.pool, &content_hash)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("track {content_hash}")))?;
    Ok(Json(track))
}

#[derive(Debug, Serialize)]
pub struct EffectiveCuesResponse {
    pub cues: Vec<CuePoint>,
}

pub async fn list_cues(
    State(state): State<AppState>,
    Path(content_hash): Path<String>,
) -> EngineResult<Json<EffectiveCuesResponse>> {
    let analysis = analyses::latest_complete(&state.pool, &content_hash)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("no complete analysis for {content_hash}")))?;
    let edits = cue_edits::list_cue_edits(&state.pool, &content_hash).await?;
    let cues = crate::model::effective_cues(&analysis.cue_points, &edits);
    Ok(Json(EffectiveCuesResponse { cues }))
}

#[derive(Debug, Deserialize)]
pub struct PutCueEditRequest {
    pub beat_index: i64,
    pub cue_type: crate::model::CueType,
    pub label: Option<String>,
}

pub async fn put_cue_edit(
    State(state): State<AppState>,
    Path((content_hash, cue_index)): Path<(String, i64)>,
    Json(request): Json<PutCueEditRequest>,
) -> EngineResult<Json<CueEdit>> {
    tracks::get_track(&state.pool, &content_hash)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("track {content_hash}")))?;

    let edit = CueEdit {
        content_hash: content_hash.clone(),
        cue_index,
        beat_index: request.beat_index,
        cue_type: request.cue_type,
        label: request.label,
        updated_at: Utc::now(),
    };
    cue_edits::upsert_cue_edit(&state.pool, &edit).await?;
    Ok(Json(edit))
}
