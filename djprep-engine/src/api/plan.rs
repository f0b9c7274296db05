//! `POST /plan`: builds a Set Planner graph over the requested tracks'
//! latest complete Analyses.

use crate::db::analyses;
use crate::error::EngineError;
use crate::model::SetMode;
use crate::planner::{self, PlanConstraints, SetPlan};
use crate::{AppState, EngineResult};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub tracks: Vec<String>,
    pub mode: SetMode,
    #[serde(default)]
    pub constraints: Option<PlanConstraintsInput>,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct PlanConstraintsInput {
    #[serde(default)]
    pub must_play: Vec<String>,
    #[serde(default)]
    pub banned: Vec<String>,
    #[serde(default)]
    pub locked_edges: Vec<(String, String)>,
    pub max_bpm_step: Option<f64>,
    pub max_key_steps: Option<u8>,
    pub start_track: Option<String>,
    pub end_track: Option<String>,
}

impl From<PlanConstraintsInput> for PlanConstraints {
    fn from(input: PlanConstraintsInput) -> Self {
        let defaults = PlanConstraints::with_defaults();
        PlanConstraints {
            must_play: input.must_play,
            banned: input.banned,
            locked_edges: input.locked_edges,
            max_bpm_step: input.max_bpm_step.unwrap_or(defaults.max_bpm_step),
            max_key_steps: input.max_key_steps.unwrap_or(defaults.max_key_steps),
            start_track: input.start_track,
            end_track: input.end_track,
        }
    }
}

pub async fn plan(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> EngineResult<Json<SetPlan>> {
    if request.tracks.is_empty() {
        return Err(EngineError::BadRequest("tracks must not be empty".into()));
    }

    let mut candidates = Vec::with_capacity(request.tracks.len());
    for content_hash in &request.tracks {
        let analysis = analyses::latest_complete(&state.pool, content_hash)
            .await?
            .ok_or_else(|| {
                EngineError::BadRequest(format!("no complete analysis for {content_hash}"))
            })?;
        candidates.push(analysis);
    }

    let constraints = request.constraints.unwrap_or_default().into();
    let set_plan = planner::plan(&candidates, request.mode, &constraints, request.seed)
        .map_err(|e| EngineError::InfeasiblePlan { reason: e.reason, message: e.message })?;

    Ok(Json(set_plan))
}
