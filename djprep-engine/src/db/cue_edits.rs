//! Cue edit rows (preserving user edits across re-analysis):
//! user overrides survive re-analysis because they live in their own
//! table, keyed by `(content_hash, cue_index)`, independent of the
//! Analysis row's version.

use crate::model::{CueEdit, CueType};
use chrono::{DateTime, Utc};
use djprep_common::Result;
use sqlx::{Row, SqlitePool};

fn cue_type_str(cue_type: CueType) -> &'static str {
    match cue_type {
        CueType::Load => "load",
        CueType::FirstDownbeat => "first_downbeat",
        CueType::Drop => "drop",
        CueType::FadeIn => "fade_in",
        CueType::FadeOut => "fade_out",
        CueType::Loop => "loop",
        CueType::Other => "other",
    }
}

fn cue_type_from_str(s: &str) -> CueType {
    match s {
        "first_downbeat" => CueType::FirstDownbeat,
        "drop" => CueType::Drop,
        "fade_in" => CueType::FadeIn,
        "fade_out" => CueType::FadeOut,
        "loop" => CueType::Loop,
        "other" => CueType::Other,
        _ => CueType::Load,
    }
}

/// Insert or replace a single cue override. Replacing an edit at the same
/// index updates it in place rather than accumulating history.
pub async fn upsert_cue_edit(pool: &SqlitePool, edit: &CueEdit) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cue_edits (content_hash, cue_index, beat_index, cue_type, label, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(content_hash, cue_index) DO UPDATE SET
            beat_index = excluded.beat_index,
            cue_type = excluded.cue_type,
            label = excluded.label,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&edit.content_hash)
    .bind(edit.cue_index)
    .bind(edit.beat_index)
    .bind(cue_type_str(edit.cue_type))
    .bind(&edit.label)
    .bind(edit.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_cue_edits(pool: &SqlitePool, content_hash: &str) -> Result<Vec<CueEdit>> {
    let rows = sqlx::query(
        "SELECT content_hash, cue_index, beat_index, cue_type, label, updated_at \
         FROM cue_edits WHERE content_hash = ? ORDER BY cue_index",
    )
    .bind(content_hash)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_cue_edit).collect())
}

fn row_to_cue_edit(row: sqlx::sqlite::SqliteRow) -> CueEdit {
    let updated_at: String = row.get("updated_at");
    CueEdit {
        content_hash: row.get("content_hash"),
        cue_index: row.get("cue_index"),
        beat_index: row.get("beat_index"),
        cue_type: cue_type_from_str(&row.get::<String, _>("cue_type")),
        label: row.get("label"),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{schema, tracks};
    use crate::model::Track;
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

    fn edit(cue_index: i64, beat_index: i64) -> CueEdit {
        CueEdit {
            content_hash: "H1".into(),
            cue_index,
            beat_index,
            cue_type: CueType::Drop,
            label: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn resubmitting_an_edit_at_the_same_index_replaces_it() {
        let pool = setup().await;
        upsert_cue_edit(&pool, &edit(2, 128)).await.unwrap();
        upsert_cue_edit(&pool, &edit(2, 130)).await.unwrap();

        let edits = list_cue_edits(&pool, "H1").await.unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].beat_index, 130);
    }

    #[tokio::test]
    async fn edits_at_distinct_indices_accumulate() {
        let pool = setup().await;
        upsert_cue_edit(&pool, &edit(0, 0)).await.unwrap();
        upsert_cue_edit(&pool, &edit(2, 130)).await.unwrap();

        let edits = list_cue_edits(&pool, "H1").await.unwrap();
        assert_eq!(edits.len(), 2);
    }
}
