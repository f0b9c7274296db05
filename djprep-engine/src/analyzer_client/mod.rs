//! Analyzer Worker client: a binary-framed TCP
//! request/response protocol, consumed by the Job Scheduler as a
//! stateless RPC target. The DSP/ML itself lives entirely on the other
//! side of this boundary.

use crate::model::{Analysis, AnalysisStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// `AnalyzeJob` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeJob {
    pub content_hash: String,
    pub path: String,
    pub target_sample_rate: u32,
    pub mono: bool,
    pub dynamic_tempo: bool,
    pub tempo_floor: f64,
    pub tempo_ceil: f64,
    pub max_cues: u8,
    pub snap_to_downbeat: bool,
    pub analysis_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResult {
    pub analysis: Analysis,
    /// Packed waveform-tile payload; opaque to the
    /// scheduler beyond handing it to the Content Store.
    pub waveform_tiles: Vec<u8>,
}

/// Failure classification the scheduler uses to decide retry-vs-fail.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalyzeError {
    #[error("path missing: {0}")]
    NotFound(String),
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),
    #[error("analyzer internal error: {0}")]
    InternalError(String),
    #[error("analyzer timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

impl AnalyzeError {
    /// `true` when the Job Scheduler should retry with backoff rather
    /// than mark the job `failed` outright.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalyzeError::InternalError(_) | AnalyzeError::Timeout | AnalyzeError::Transport(_)
        )
    }
}

#[async_trait]
pub trait AnalyzerClient: Send + Sync {
    async fn analyze(&self, job: AnalyzeJob) -> Result<AnalyzeResult, AnalyzeError>;
}

/// TCP client for the real worker: one connection per request, a 4-byte
/// big-endian length prefix around a JSON payload, with a combined
/// decode+inference timeout applied as one per-request deadline
/// (default 60s decode / 120s inference budget).
pub struct TcpAnalyzerClient {
    addr: String,
    timeout: Duration,
}

impl TcpAnalyzerClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    async fn roundtrip(&self, job: &AnalyzeJob) -> io::Result<AnalyzeResult> {
        let mut stream = TcpStream::connect(&self.addr).await?;

        let payload = serde_json::to_vec(job)?;
        stream.write_u32(payload.len() as u32).await?;
        stream.write_all(&payload).await?;
        stream.flush().await?;

        let len = stream.read_u32().await? as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;

        serde_json::from_slice(&buf).map_err(io::Error::from)
    }

}

#[async_trait]
impl AnalyzerClient for TcpAnalyzerClient {
    async fn analyze(&self, job: AnalyzeJob) -> Result<AnalyzeResult, AnalyzeError> {
        match tokio::time::timeout(self.timeout, self.roundtrip(&job)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) if err.kind() == io::ErrorKind::NotFound => {
                Err(AnalyzeError::NotFound(job.path.clone()))
            }
            Ok(Err(err)) => Err(AnalyzeError::Transport(err.to_string())),
            Err(_) => Err(AnalyzeError::Timeout),
        }
    }
}

/// Deterministic in-memory stub for scheduler tests: returns a fixed
/// passing `AnalyzeResult`, a configured error, or a queued sequence of
/// outcomes (one per call, repeating the last once exhausted), without
/// any I/O.
pub struct MockAnalyzerClient {
    outcomes: std::sync::Mutex<std::collections::VecDeque<Result<AnalyzeResult, AnalyzeError>>>,
}

impl MockAnalyzerClient {
    pub fn always_ok(result: AnalyzeResult) -> Self {
        Self::sequence(vec![Ok(result)])
    }

    pub fn always_err(err: AnalyzeError) -> Self {
        Self::sequence(vec![Err(err)])
    }

    /// Returns `outcomes[0]` on the first call, `outcomes[1]` on the
    /// second, and so on, repeating the last entry for every call past
    /// the end of the list — e.g. `[err, err, ok]` for two transient
    /// failures followed by a success.
    pub fn sequence(outcomes: Vec<Result<AnalyzeResult, AnalyzeError>>) -> Self {
        Self {
            outcomes: std::sync::Mutex::new(outcomes.into()),
        }
    }
}

#[async_trait]
impl AnalyzerClient for MockAnalyzerClient {
    async fn analyze(&self, job: AnalyzeJob) -> Result<AnalyzeResult, AnalyzeError> {
        let mut outcomes = self.outcomes.lock().unwrap();
        match outcomes.len() {
            0 => Ok(default_result(job)),
            1 => outcomes.front().unwrap().clone(),
            _ => outcomes.pop_front().unwrap(),
        }
    }
}

fn default_result(job: AnalyzeJob) -> AnalyzeResult {
    AnalyzeResult {
        analysis: Analysis {
            content_hash: job.content_hash,
            version: job.analysis_version,
            status: AnalysisStatus::Complete,
            duration: 180.0,
            bpm: Some(128.0),
            bpm_confidence: Some(0.95),
            key: Some("8A".into()),
            key_confidence: Some(0.9),
            energy: Some(6),
            integrated_loudness: Some(-14.0),
            true_peak: Some(-1.0),
            loudness_range: Some(6.0),
            beatgrid: vec![0.0, 0.5, 1.0, 1.5],
            sections: vec![],
            cue_points: vec![],
            embedding: None,
            openl3_embedding: None,
        },
        waveform_tiles: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> AnalyzeJob {
        AnalyzeJob {
            content_hash: "H1".into(),
            path: "/music/h1.wav".into(),
            target_sample_rate: 22050,
            mono: true,
            dynamic_tempo: true,
            tempo_floor: 60.0,
            tempo_ceil: 200.0,
            max_cues: 8,
            snap_to_downbeat: true,
            analysis_version: 1,
        }
    }

    #[tokio::test]
    async fn mock_client_falls_back_to_a_default_passing_result() {
        let client = MockAnalyzerClient::sequence(vec![]);
        let result = client.analyze(sample_job()).await.unwrap();
        assert_eq!(result.analysis.content_hash, "H1");
    }

    #[tokio::test]
    async fn mock_client_sequence_repeats_its_last_entry() {
        let client = MockAnalyzerClient::sequence(vec![
            Err(AnalyzeError::Timeout),
            Err(AnalyzeError::Timeout),
            Ok(default_result(sample_job())),
        ]);
        assert!(client.analyze(sample_job()).await.is_err());
        assert!(client.analyze(sample_job()).await.is_err());
        assert!(client.analyze(sample_job()).await.is_ok());
        assert!(client.analyze(sample_job()).await.is_ok());
    }

    #[test]
    fn internal_error_and_timeout_are_transient_not_found_is_not() {
        assert!(AnalyzeError::InternalError("x".into()).is_transient());
        assert!(AnalyzeError::Timeout.is_transient());
        assert!(!AnalyzeError::NotFound("x".into()).is_transient());
        assert!(!AnalyzeError::UnsupportedCodec("x".into()).is_transient());
    }
}
