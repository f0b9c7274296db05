//! Job Scheduler: turns new/modified files and
//! explicit re-analyze requests into completed Analyses, with
//! at-most-one concurrent build per `(content_hash, version)`, bounded
//! parallelism, and retry with backoff on transient failures.

use crate::analyzer_client::{AnalyzeError, AnalyzeJob, AnalyzerClient};
use crate::db::{content_store::ContentStore, jobs, similarity, tracks};
use crate::model::{JobEvent, JobKey, JobPriority, JobState};
use chrono::Utc;
use djprep_common::{EventBus, Result};
use futures::future::join_all;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default retry cap for transient failures.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

struct InFlight {
    claimed: HashSet<JobKey>,
    bytes: u64,
}

pub struct Scheduler {
    pool: SqlitePool,
    store: ContentStore,
    analyzer: Arc<dyn AnalyzerClient>,
    events: EventBus<JobEvent>,
    concurrency: usize,
    memory_budget_bytes: u64,
    max_attempts: u32,
    in_flight: Mutex<InFlight>,
}

impl Scheduler {
    pub fn new(
        pool: SqlitePool,
        store: ContentStore,
        analyzer: Arc<dyn AnalyzerClient>,
        concurrency: usize,
        memory_budget_bytes: u64,
    ) -> Self {
        Self {
            pool,
            store,
            analyzer,
            events: EventBus::new(256),
            concurrency,
            memory_budget_bytes,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            in_flight: Mutex::new(InFlight {
                claimed: HashSet::new(),
                bytes: 0,
            }),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// `Submit`: deduplicates against any non-terminal
    /// job already queued for the same `(content_hash, version)`.
    pub async fn submit(
        &self,
        content_hash: &str,
        version: i64,
        priority: JobPriority,
    ) -> Result<Uuid> {
        let key = JobKey {
            content_hash: content_hash.to_string(),
            version,
        };

        for existing in jobs::load_active_jobs(&self.pool).await? {
            if existing.key == key {
                return Ok(existing.job_id);
            }
        }

        let job_id = Uuid::new_v4();
        let now = Utc::now();
        jobs::insert_job(
            &self.pool,
            &jobs::JobRow {
                job_id,
                key: key.clone(),
                state: JobState::Enqueued,
                priority,
                attempt: 0,
                reason: None,
                created_at: now,
                updated_at: now,
            },
        )
        .await?;

        self.events.emit_lossy(JobEvent {
            job_id,
            track: key.content_hash,
            version: key.version,
            state: JobState::Enqueued,
            attempt: 0,
            reason: None,
            duration_ms: None,
        });

        Ok(job_id)
    }

    /// `Cancel`: cooperative, only valid from a
    /// non-terminal state.
    pub async fn cancel(&self, job_id: Uuid) -> Result<()> {
        let job = jobs::get_job(&self.pool, job_id)
            .await?
            .ok_or_else(|| djprep_common::Error::NotFound(format!("job {job_id}")))?;

        if job.state.is_terminal() {
            return Err(djprep_common::Error::InvalidInput(format!(
                "job {job_id} already in terminal state {:?}",
                job.state
            )));
        }

        self.in_flight.lock().unwrap().claimed.remove(&job.key);
        jobs::update_job_state(&self.pool, job_id, JobState::Cancelled, job.attempt, None).await?;

        self.events.emit_lossy(JobEvent {
            job_id,
            track: job.key.content_hash,
            version: job.key.version,
            state: JobState::Cancelled,
            attempt: job.attempt,
            reason: None,
            duration_ms: None,
        });

        Ok(())
    }

    /// One dispatch cycle: claims as many eligible enqueued jobs as the
    /// concurrency cap and memory budget allow, runs them concurrently,
    /// and applies their outcomes. Returns the number of jobs dispatched.
    pub async fn run_cycle(&self) -> Result<usize> {
        let active = jobs::load_active_jobs(&self.pool).await?;
        let mut batch = Vec::new();

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            for job in active {
                if job.state != JobState::Enqueued || in_flight.claimed.contains(&job.key) {
                    continue;
                }
                let estimated_bytes = estimate_job_memory(&job.key);
                if in_flight.claimed.len() >= self.concurrency
                    || in_flight.bytes + estimated_bytes > self.memory_budget_bytes
                {
                    continue;
                }
                in_flight.claimed.insert(job.key.clone());
                in_flight.bytes += estimated_bytes;
                batch.push((job, estimated_bytes));
            }
        }

        let dispatched = batch.len();
        let futures = batch
            .into_iter()
            .map(|(job, bytes)| self.run_job(job, bytes));
        join_all(futures).await;

        Ok(dispatched)
    }

    async fn run_job(&self, job: jobs::JobRow, estimated_bytes: u64) {
        let started = Instant::now();
        let attempt = job.attempt + 1;

        jobs::update_job_state(&self.pool, job.job_id, JobState::Running, attempt, None)
            .await
            .ok();
        self.events.emit_lossy(JobEvent {
            job_id: job.job_id,
            track: job.key.content_hash.clone(),
            version: job.key.version,
            state: JobState::Running,
            attempt,
            reason: None,
            duration_ms: None,
        });

        let outcome = self.execute(&job.key).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let final_state = match outcome {
            Ok(()) => {
                jobs::update_job_state(&self.pool, job.job_id, JobState::Complete, attempt, None)
                    .await
                    .ok();
                JobState::Complete
            }
            Err(err) if err.is_transient() && attempt < self.max_attempts => {
                jobs::update_job_state(
                    &self.pool,
                    job.job_id,
                    JobState::Enqueued,
                    attempt,
                    Some(&err.to_string()),
                )
                .await
                .ok();
                JobState::Enqueued
            }
            Err(err) => {
                jobs::update_job_state(
                    &self.pool,
                    job.job_id,
                    JobState::Failed,
                    attempt,
                    Some(&err.to_string()),
                )
                .await
                .ok();
                JobState::Failed
            }
        };

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight.claimed.remove(&job.key);
            in_flight.bytes = in_flight.bytes.saturating_sub(estimated_bytes);
        }

        self.events.emit_lossy(JobEvent {
            job_id: job.job_id,
            track: job.key.content_hash,
            version: job.key.version,
            state: final_state,
            attempt,
            reason: None,
            duration_ms: Some(duration_ms),
        });
    }

    async fn execute(&self, key: &JobKey) -> std::result::Result<(), AnalyzeError> {
        let track = tracks::get_track(&self.pool, &key.content_hash)
            .await
            .map_err(|e| AnalyzeError::InternalError(e.to_string()))?
            .ok_or_else(|| AnalyzeError::NotFound(key.content_hash.clone()))?;

        let request = AnalyzeJob {
            content_hash: key.content_hash.clone(),
            path: track.path,
            target_sample_rate: 22050,
            mono: true,
            dynamic_tempo: true,
            tempo_floor: 60.0,
            tempo_ceil: 200.0,
            max_cues: 8,
            snap_to_downbeat: true,
            analysis_version: key.version,
        };

        let result = self.analyzer.analyze(request).await?;

        self.store
            .put(
                crate::db::content_store::BlobKind::WaveformTiles,
                &key.content_hash,
                key.version,
                &result.waveform_tiles,
            )
            .await
            .map_err(|e| AnalyzeError::InternalError(e.to_string()))?;

        self.apply_outcome(&result.analysis)
            .await
            .map_err(|e| AnalyzeError::InternalError(e.to_string()))
    }

    /// Outcome application: inserts the new Analysis and
    /// invalidates stale SimilarityEdges in one transaction. CueEdits are
    /// never touched here — they live in a separate table untouched by
    /// this write.
    async fn apply_outcome(&self, analysis: &crate::model::Analysis) -> Result<()> {
        let mut tx = self.pool.begin().await?;

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
        .bind("complete")
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
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM similarity_edges WHERE track_a = ? OR track_b = ?")
            .bind(&analysis.content_hash)
            .bind(&analysis.content_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Requires `&self.pool` indirectly through `similarity`; exposed so
    /// callers outside the scheduler (e.g. tests) can confirm edges were
    /// actually invalidated without reaching into private state.
    pub async fn similarity_edges_for(&self, content_hash: &str) -> Result<usize> {
        Ok(similarity::edges_for_track(&self.pool, content_hash)
            .await?
            .len())
    }
}

/// Size-based memory heuristic for the scheduler's admission gate: a
/// flat per-job estimate is used in place of a real
/// per-track decode-buffer estimate, since that depends on the
/// Analyzer Worker's internal implementation, which this core does not
/// specify.
fn estimate_job_memory(_key: &JobKey) -> u64 {
    64 * 1024 * 1024
}

#[allow(dead_code)]
fn decode_timeout() -> Duration {
    Duration::from_secs(60)
}
