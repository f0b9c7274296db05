//! `POST /export`: assembles the requested tracks' latest complete
//! Analyses and cue edits, then runs the Exporter Suite over them.

use crate::db::{analyses, cue_edits, tracks};
use crate::error::EngineError;
use crate::export::{self, ExportFormat, ExportRequest, ExportResult, ExportTrack};
use crate::{AppState, EngineResult};
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ExportRequestBody {
    pub playlist_name: String,
    pub tracks: Vec<String>,
    pub formats: Vec<ExportFormat>,
}

pub async fn export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequestBody>,
) -> EngineResult<Json<ExportResult>> {
    let mut export_tracks = Vec::with_capacity(request.tracks.len());
    for content_hash in &request.tracks {
        let track = tracks::get_track(&state.pool, content_hash)
            .await?
            .ok_or_else(|| EngineError::BadRequest(format!("unknown track {content_hash}")))?;
        let analysis = analyses::latest_complete(&state.pool, content_hash)
            .await?
            .ok_or_else(|| {
                EngineError::BadRequest(format!("no complete analysis for {content_hash}"))
            })?;
        let edits = cue_edits::list_cue_edits(&state.pool, content_hash).await?;
        export_tracks.push(ExportTrack {
            track,
            analysis,
            cue_edits: edits,
        });
    }

    let export_request = ExportRequest {
        playlist_name: request.playlist_name,
        tracks: export_tracks,
        formats: request.formats,
    };

    let result = export::export(&state.config.exports_dir(), &export_request, Utc::now())?;
    Ok(Json(result))
}
