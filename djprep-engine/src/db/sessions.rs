//! Set session rows: the ordered track list, mode, and edge
//! scores a planning run produced, saved under a user-chosen name so the
//! Exporter can be pointed at it later without replanning.

use crate::model::{SetMode, SetSession};
use chrono::{DateTime, Utc};
use djprep_common::Result;
use sqlx::{Row, SqlitePool};

fn set_mode_str(mode: SetMode) -> &'static str {
    match mode {
        SetMode::WarmUp => "warm_up",
        SetMode::PeakTime => "peak_time",
        SetMode::OpenFormat => "open_format",
    }
}

fn set_mode_from_str(s: &str) -> SetMode {
    match s {
        "peak_time" => SetMode::PeakTime,
        "open_format" => SetMode::OpenFormat,
        _ => SetMode::WarmUp,
    }
}

pub async fn save_session(pool: &SqlitePool, session: &SetSession) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO set_sessions (name, tracks_json, mode, edges_json, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            tracks_json = excluded.tracks_json,
            mode = excluded.mode,
            edges_json = excluded.edges_json,
            created_at = excluded.created_at
        "#,
    )
    .bind(&session.name)
    .bind(serde_json::to_string(&session.tracks)?)
    .bind(set_mode_str(session.mode.clone()))
    .bind(serde_json::to_string(&session.edges)?)
    .bind(session.created_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_session(pool: &SqlitePool, name: &str) -> Result<Option<SetSession>> {
    let row = sqlx::query("SELECT * FROM set_sessions WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    row.map(row_to_session).transpose()
}

fn row_to_session(row: sqlx::sqlite::SqliteRow) -> Result<SetSession> {
    let tracks_json: String = row.get("tracks_json");
    let edges_json: String = row.get("edges_json");
    let created_at: String = row.get("created_at");
    Ok(SetSession {
        name: row.get("name"),
        tracks: serde_json::from_str(&tracks_json)?,
        mode: set_mode_from_str(&row.get::<String, _>("mode")),
        edges: serde_json::from_str(&edges_json)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        schema::initialize(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn save_and_reload_round_trips_track_order() {
        let pool = setup().await;
        let session = SetSession {
            name: "friday-peak".into(),
            tracks: vec!["A".into(), "B".into(), "C".into()],
            mode: SetMode::PeakTime,
            edges: vec![],
            created_at: Utc::now(),
        };
        save_session(&pool, &session).await.unwrap();

        let loaded = get_session(&pool, "friday-peak").await.unwrap().unwrap();
        assert_eq!(loaded.tracks, vec!["A", "B", "C"]);
        assert_eq!(loaded.mode, SetMode::PeakTime);
    }

    #[tokio::test]
    async fn saving_under_an_existing_name_overwrites_it() {
        let pool = setup().await;
        let mut session = SetSession {
            name: "s1".into(),
            tracks: vec!["A".into()],
            mode: SetMode::WarmUp,
            edges: vec![],
            created_at: Utc::now(),
        };
        save_session(&pool, &session).await.unwrap();
        session.tracks = vec!["A".into(), "B".into()];
        save_session(&pool, &session).await.unwrap();

        let loaded = get_session(&pool, "s1").await.unwrap().unwrap();
        assert_eq!(loaded.tracks.len(), 2);
    }
}
