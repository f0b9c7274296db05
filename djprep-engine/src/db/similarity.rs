//! Similarity edge rows: pairwise scores feeding the Set
//! Planner. Edges are directed — `(track_a, track_b)` and `(track_b,
//! track_a)` are stored as two independent rows, since the energy
//! component (and therefore `combined_score`) is not symmetric under
//! `warm_up`/`peak_time` modes.

use crate::model::{KeyRelation, SimilarityEdge};
use djprep_common::Result;
use sqlx::{Row, SqlitePool};

fn key_relation_str(relation: KeyRelation) -> &'static str {
    match relation {
        KeyRelation::Same => "same",
        KeyRelation::Relative => "relative",
        KeyRelation::Compatible => "compatible",
        KeyRelation::Harmonic => "harmonic",
        KeyRelation::Clash => "clash",
        KeyRelation::Unknown => "unknown",
    }
}

fn key_relation_from_str(s: &str) -> KeyRelation {
    match s {
        "same" => KeyRelation::Same,
        "relative" => KeyRelation::Relative,
        "compatible" => KeyRelation::Compatible,
        "harmonic" => KeyRelation::Harmonic,
        "clash" => KeyRelation::Clash,
        _ => KeyRelation::Unknown,
    }
}

/// Upserts one directed edge, keyed exactly by `(edge.track_a,
/// edge.track_b)`. The reverse direction, if scored, lives in its own row
/// and is untouched by this call.
pub async fn upsert_edge(pool: &SqlitePool, edge: &SimilarityEdge) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO similarity_edges
            (track_a, track_b, combined_score, openl3, tempo, key_score, energy, key_relation, explanation)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(track_a, track_b) DO UPDATE SET
            combined_score = excluded.combined_score,
            openl3 = excluded.openl3,
            tempo = excluded.tempo,
            key_score = excluded.key_score,
            energy = excluded.energy,
            key_relation = excluded.key_relation,
            explanation = excluded.explanation
        "#,
    )
    .bind(&edge.track_a)
    .bind(&edge.track_b)
    .bind(edge.combined_score)
    .bind(edge.openl3)
    .bind(edge.tempo)
    .bind(edge.key)
    .bind(edge.energy)
    .bind(key_relation_str(edge.key_relation))
    .bind(&edge.explanation)
    .execute(pool)
    .await?;
    Ok(())
}

/// All edges touching `content_hash`, in either column.
pub async fn edges_for_track(pool: &SqlitePool, content_hash: &str) -> Result<Vec<SimilarityEdge>> {
    let rows = sqlx::query(
        "SELECT * FROM similarity_edges WHERE track_a = ? OR track_b = ?",
    )
    .bind(content_hash)
    .bind(content_hash)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_edge).collect())
}

pub async fn all_edges(pool: &SqlitePool) -> Result<Vec<SimilarityEdge>> {
    let rows = sqlx::query("SELECT * FROM similarity_edges")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(row_to_edge).collect())
}

/// Drop every edge touching `content_hash`. Called when a re-analysis
/// completes, since prior scores no longer reflect the track's current
/// Analysis.
pub async fn invalidate_edges_for_track(pool: &SqlitePool, content_hash: &str) -> Result<()> {
    sqlx::query("DELETE FROM similarity_edges WHERE track_a = ? OR track_b = ?")
        .bind(content_hash)
        .bind(content_hash)
        .execute(pool)
        .await?;
    Ok(())
}

fn row_to_edge(row: sqlx::sqlite::SqliteRow) -> SimilarityEdge {
    SimilarityEdge {
        track_a: row.get("track_a"),
        track_b: row.get("track_b"),
        combined_score: row.get("combined_score"),
        openl3: row.get("openl3"),
        tempo: row.get("tempo"),
        key: row.get("key_score"),
        energy: row.get("energy"),
        key_relation: key_relation_from_str(&row.get::<String, _>("key_relation")),
        explanation: row.get("explanation"),
    }
}
