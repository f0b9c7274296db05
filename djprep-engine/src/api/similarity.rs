//! `GET /similarity/:content_hash`: the Set Planner's raw edges touching
//! one track, for callers that want scores without running a full plan.

use crate::db::similarity;
use crate::model::SimilarityEdge;
use crate::{AppState, EngineResult};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct SimilarityQuery {
    pub limit: Option<usize>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(content_hash): Path<String>,
    Query(params): Query<SimilarityQuery>,
) -> EngineResult<Json<Vec<SimilarityEdge>>> {
    let mut edges = similarity::edges_for_track(&state.pool, &content_hash).await?;
    edges.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    if let Some(limit) = params.limit {
        edges.truncate(limit);
    }
    Ok(Json(edges))
}
