//! Track rows: upsert by content_hash, fetch, list with filters.

use crate::model::Track;
use chrono::{DateTime, Utc};
use djprep_common::Result;
use sqlx::{Row, SqlitePool};

/// content_hash uniquely identifies a Track; re-scan of the same bytes is
/// idempotent (`INSERT ... ON CONFLICT DO UPDATE` never creates a
/// duplicate row).
pub async fn upsert_track(pool: &SqlitePool, track: &Track) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tracks (content_hash, path, size, mtime, title, artist, album)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(content_hash) DO UPDATE SET
            path = excluded.path,
            size = excluded.size,
            mtime = excluded.mtime,
            title = COALESCE(excluded.title, tracks.title),
            artist = COALESCE(excluded.artist, tracks.artist),
            album = COALESCE(excluded.album, tracks.album)
        "#,
    )
    .bind(&track.content_hash)
    .bind(&track.path)
    .bind(track.size as i64)
    .bind(track.mtime.to_rfc3339())
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.album)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_track(pool: &SqlitePool, content_hash: &str) -> Result<Option<Track>> {
    let row = sqlx::query(
        "SELECT content_hash, path, size, mtime, title, artist, album FROM tracks WHERE content_hash = ?",
    )
    .bind(content_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_track))
}

#[derive(Debug, Clone, Default)]
pub struct TrackFilter {
    pub query: Option<String>,
    pub key: Option<String>,
    pub bpm_min: Option<f64>,
    pub bpm_max: Option<f64>,
    pub limit: i64,
    pub offset: i64,
}

/// Filters join against each track's latest complete Analysis for
/// key/BPM, and against title/artist/album for free text.
pub async fn list_tracks(pool: &SqlitePool, filter: &TrackFilter) -> Result<Vec<Track>> {
    let mut sql = String::from(
        r#"
        SELECT t.content_hash, t.path, t.size, t.mtime, t.title, t.artist, t.album
        FROM tracks t
        LEFT JOIN (
            SELECT content_hash, key, bpm, MAX(version) AS version
            FROM analyses
            WHERE status = 'complete'
            GROUP BY content_hash
        ) a ON a.content_hash = t.content_hash
        WHERE 1 = 1
        "#,
    );

    if filter.query.is_some() {
        sql.push_str(" AND (t.title LIKE ? OR t.artist LIKE ? OR t.album LIKE ?)");
    }
    if filter.key.is_some() {
        sql.push_str(" AND a.key = ?");
    }
    if filter.bpm_min.is_some() {
        sql.push_str(" AND a.bpm >= ?");
    }
    if filter.bpm_max.is_some() {
        sql.push_str(" AND a.bpm <= ?");
    }
    sql.push_str(" ORDER BY t.content_hash LIMIT ? OFFSET ?");

    let mut query = sqlx::query(&sql);
    if let Some(q) = &filter.query {
        let pattern = format!("%{q}%");
        query = query.bind(pattern.clone()).bind(pattern.clone()).bind(pattern);
    }
    if let Some(key) = &filter.key {
        query = query.bind(key);
    }
    if let Some(bpm_min) = filter.bpm_min {
        query = query.bind(bpm_min);
    }
    if let Some(bpm_max) = filter.bpm_max {
        query = query.bind(bpm_max);
    }
    query = query.bind(filter.limit).bind(filter.offset);

    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(row_to_track).collect())
}

fn row_to_track(row: sqlx::sqlite::SqliteRow) -> Track {
    let mtime: String = row.get("mtime");
    Track {
        content_hash: row.get("content_hash"),
        path: row.get("path"),
        size: row.get::<i64, _>("size") as u64,
        mtime: DateTime::parse_from_rfc3339(&mtime)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        title: row.get("title"),
        artist: row.get("artist"),
        album: row.get("album"),
    }
}
