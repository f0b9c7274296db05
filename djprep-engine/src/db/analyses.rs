//! Analysis rows: insert (rejecting duplicate version),
//! atomic status transitions, and latest-complete lookup.

use crate::model::{Analysis, AnalysisStatus, CuePoint, Section};
use djprep_common::{Error, Result};
use sqlx::{Row, SqlitePool};

fn status_str(status: AnalysisStatus) -> &'static str {
    match status {
        AnalysisStatus::Pending => "pending",
        AnalysisStatus::Running => "running",
        AnalysisStatus::Complete => "complete",
        AnalysisStatus::Failed => "failed",
    }
}

fn status_from_str(s: &str) -> AnalysisStatus {
    match s {
        "running" => AnalysisStatus::Running,
        "complete" => AnalysisStatus::Complete,
        "failed" => AnalysisStatus::Failed,
        _ => AnalysisStatus::Pending,
    }
}

/// Inserts a new Analysis row. Exactly one Analysis per `(track, version)`
/// is permitted — a duplicate insert is a `Conflict`, not silently ignored.
pub async fn insert_analysis(pool: &SqlitePool, analysis: &Analysis) -> Result<()> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM analyses WHERE content_hash = ? AND version = ?",
    )
    .bind(&analysis.content_hash)
    .bind(analysis.version)
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Err(Error::InvalidInput(format!(
            "analysis already exists for ({}, v{})",
            analysis.content_hash, analysis.version
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO analyses (
            content_hash, version, status, duration, bpm, bpm_confidence,
            key, key_confidence, energy, integrated_loudness, true_peak,
            loudness_range, beatgrid_json, sections_json, cue_points_json,
            embedding_json, openl3_embedding_json
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&analysis.content_hash)
    .bind(analysis.version)
    .bind(status_str(analysis.status))
    .bind(analysis.duration)
    .bind(analysis.bpm)
    .bind(analysis.bpm_confidence)
    .bind(&analysis.key)
    .bind(analysis.key_confidence)
    .bind(analysis.energy.map(|e| e as i64))
    .bind(analysis.integrated_loudness)
    .bind(analysis.true_peak)
    .bind(analysis.loudness_range)
    .bind(serde_json::to_string(&analysis.beatgrid)?)
    .bind(serde_json::to_string(&analysis.sections)?)
    .bind(serde_json::to_string(&analysis.cue_points)?)
    .bind(
        analysis
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(
        analysis
            .openl3_embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_status(
    pool: &SqlitePool,
    content_hash: &str,
    version: i64,
    status: AnalysisStatus,
) -> Result<()> {
    sqlx::query("UPDATE analyses SET status = ? WHERE content_hash = ? AND version = ?")
        .bind(status_str(status))
        .bind(content_hash)
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Fetch the highest-versioned `complete` Analysis for a track, if any.
pub async fn latest_complete(pool: &SqlitePool, content_hash: &str) -> Result<Option<Analysis>> {
    let row = sqlx::query(
        r#"
        SELECT * FROM analyses
        WHERE content_hash = ? AND status = 'complete'
        ORDER BY version DESC LIMIT 1
        "#,
    )
    .bind(content_hash)
    .fetch_optional(pool)
    .await?;

    row.map(row_to_analysis).transpose()
}

fn row_to_analysis(row: sqlx::sqlite::SqliteRow) -> Result<Analysis> {
    let beatgrid_json: String = row.get("beatgrid_json");
    let sections_json: String = row.get("sections_json");
    let cue_points_json: String = row.get("cue_points_json");
    let embedding_json: Option<String> = row.get("embedding_json");
    let openl3_json: Option<String> = row.get("openl3_embedding_json");

    Ok(Analysis {
        content_hash: row.get("content_hash"),
        version: row.get("version"),
        status: status_from_str(&row.get::<String, _>("status")),
        duration: row.get("duration"),
        bpm: row.get("bpm"),
        bpm_confidence: row.get("bpm_confidence"),
        key: row.get("key"),
        key_confidence: row.get("key_confidence"),
        energy: row.get::<Option<i64>, _>("energy").map(|e| e as u8),
        integrated_loudness: row.get("integrated_loudness"),
        true_peak: row.get("true_peak"),
        loudness_range: row.get("loudness_range"),
        beatgrid: serde_json::from_str(&beatgrid_json)?,
        sections: serde_json::from_str::<Vec<Section>>(&sections_json)?,
        cue_points: serde_json::from_str::<Vec<CuePoint>>(&cue_points_json)?,
        embedding: embedding_json.map(|s| serde_json::from_str(&s)).transpose()?,
        openl3_embedding: openl3_json.map(|s| serde_json::from_str(&s)).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{schema, tracks};
    use crate::model::Track;
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        schema::initialize(&pool).await.unwrap();
        tracks::upsert_track(
            &pool,
            &Track {
                content_hash: "H1".into(),
                path: "/music/h1.wav".into(),
                size: 1,
                mtime: Utc::now(),
                title: None,
                artist: None,
                album: None,
            },
        )
        .await
        .unwrap();
        pool
    }

    fn sample(version: i64) -> Analysis {
        Analysis {
            content_hash: "H1".into(),
            version,
            status: AnalysisStatus::Complete,
            duration: 180.0,
            bpm: Some(128.0),
            bpm_confidence: Some(0.9),
            key: Some("8A".into()),
            key_confidence: Some(0.9),
            energy: Some(6),
            integrated_loudness: Some(-14.0),
            true_peak: Some(-1.0),
            loudness_range: Some(5.0),
            beatgrid: vec![0.0, 0.5, 1.0],
            sections: vec![],
            cue_points: vec![],
            embedding: None,
            openl3_embedding: None,
        }
    }

    #[tokio::test]
    async fn duplicate_version_insert_is_rejected() {
        let pool = setup().await;
        insert_analysis(&pool, &sample(1)).await.unwrap();
        let result = insert_analysis(&pool, &sample(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn latest_complete_prefers_highest_version() {
        let pool = setup().await;
        insert_analysis(&pool, &sample(1)).await.unwrap();
        insert_analysis(&pool, &sample(2)).await.unwrap();
        let latest = latest_complete(&pool, "H1").await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
    }

    #[tokio::test]
    async fn older_versions_remain_readable_after_failure_of_a_newer_one() {
        let pool = setup().await;
        insert_analysis(&pool, &sample(1)).await.unwrap();
        let mut failed = sample(2);
        failed.status = AnalysisStatus::Failed;
        insert_analysis(&pool, &failed).await.unwrap();

        let latest = latest_complete(&pool, "H1").await.unwrap().unwrap();
        assert_eq!(latest.version, 1);
    }
}
