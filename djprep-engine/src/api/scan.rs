//! `POST /scan`: walks the given roots and upserts every discovered
//! Track, returning the counts the UI shows after a library scan.

use crate::db::tracks::{self};
use crate::error::EngineResult;
use crate::model::Track;
use crate::scanner::{self, FileRecord};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub roots: Vec<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct ScanResponse {
    pub total: usize,
    pub new: usize,
    pub modified: usize,
    pub errors: usize,
}

pub async fn scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> EngineResult<Json<ScanResponse>> {
    let mut response = ScanResponse::default();

    for root in &request.roots {
        let records = match scanner::scan(&state.pool, std::path::Path::new(root)).await {
            Ok(records) => records,
            Err(_) => {
                response.errors += 1;
                continue;
            }
        };

        for record in records {
            response.total += 1;
            let outcome = match record {
                FileRecord::New {
                    path,
                    content_hash,
                    size,
                    mtime,
                } => upsert(&state, content_hash, path.to_string_lossy().into_owned(), size, mtime, true).await,
                FileRecord::Modified {
                    path,
                    content_hash,
                    size,
                    mtime,
                } => upsert(&state, content_hash, path.to_string_lossy().into_owned(), size, mtime, false).await,
                FileRecord::Moved {
                    content_hash,
                    new_path,
                    ..
                } => {
                    let size = tracks::get_track(&state.pool, &content_hash)
                        .await
                        .ok()
                        .flatten()
                        .map(|t| t.size)
                        .unwrap_or(0);
                    upsert(
                        &state,
                        content_hash,
                        new_path.to_string_lossy().into_owned(),
                        size,
                        chrono::Utc::now(),
                        false,
                    )
                    .await
                }
                FileRecord::Unchanged { .. } => continue,
                FileRecord::Skip { path, reason } => {
                    tracing::warn!(path = %path.display(), %reason, "scan skipped unreadable file");
                    response.errors += 1;
                    continue;
                }
            };

            match outcome {
                Some(true) => response.new += 1,
                Some(false) => response.modified += 1,
                None => response.errors += 1,
            }
        }
    }

    Ok(Json(response))
}

async fn upsert(
    state: &AppState,
    content_hash: String,
    path: String,
    size: u64,
    mtime: chrono::DateTime<chrono::Utc>,
    is_new: bool,
) -> Option<bool> {
    let track = Track {
        content_hash,
        path,
        size,
        mtime,
        title: None,
        artist: None,
        album: None,
    };
    tracks::upsert_track(&state.pool, &track).await.ok()?;
    Some(is_new)
}
