//! Schema bootstrap and versioned migrations for the metadata store
//! Table layout mirrors the core data model.

use djprep_common::db::{run_migrations, Migration};
use djprep_common::Result;
use sqlx::{SqliteConnection, SqlitePool};
use std::future::Future;
use std::pin::Pin;

/// Create the schema from scratch. This is migration 1 — every subsequent
/// structural change is a new `Migration` appended to `migrations()`,
/// never a change to this function (djprep-common's migration guidelines).
async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            content_hash TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            size INTEGER NOT NULL,
            mtime TEXT NOT NULL,
            title TEXT,
            artist TEXT,
            album TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            content_hash TEXT NOT NULL,
            version INTEGER NOT NULL,
            status TEXT NOT NULL,
            duration REAL NOT NULL,
            bpm REAL,
            bpm_confidence REAL,
            key TEXT,
            key_confidence REAL,
            energy INTEGER,
            integrated_loudness REAL,
            true_peak REAL,
            loudness_range REAL,
            beatgrid_json TEXT NOT NULL,
            sections_json TEXT NOT NULL,
            cue_points_json TEXT NOT NULL,
            embedding_json TEXT,
            openl3_embedding_json TEXT,
            PRIMARY KEY (content_hash, version),
            FOREIGN KEY (content_hash) REFERENCES tracks(content_hash)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cue_edits (
            content_hash TEXT NOT NULL,
            cue_index INTEGER NOT NULL,
            beat_index INTEGER NOT NULL,
            cue_type TEXT NOT NULL,
            label TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (content_hash, cue_index),
            FOREIGN KEY (content_hash) REFERENCES tracks(content_hash)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS similarity_edges (
            track_a TEXT NOT NULL,
            track_b TEXT NOT NULL,
            combined_score REAL NOT NULL,
            openl3 REAL NOT NULL,
            tempo REAL NOT NULL,
            key_score REAL NOT NULL,
            energy REAL NOT NULL,
            key_relation TEXT NOT NULL,
            explanation TEXT NOT NULL,
            PRIMARY KEY (track_a, track_b)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS set_sessions (
            name TEXT PRIMARY KEY,
            tracks_json TEXT NOT NULL,
            mode TEXT NOT NULL,
            edges_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            version INTEGER NOT NULL,
            state TEXT NOT NULL,
            priority TEXT NOT NULL,
            attempt INTEGER NOT NULL DEFAULT 0,
            reason TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyses_content_hash ON analyses(content_hash)")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

fn apply_v1(
    conn: &mut SqliteConnection,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
    Box::pin(migrate_v1(conn))
}

fn migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "create tracks/analyses/cue_edits/similarity_edges/set_sessions/jobs",
        apply: apply_v1,
    }]
}

/// Open the schema at its current version, refusing to proceed if the
/// on-disk version is newer than this binary's migration list.
pub async fn initialize(pool: &SqlitePool) -> Result<()> {
    run_migrations(pool, &migrations()).await
}
