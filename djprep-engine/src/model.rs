//! Core data model: Track, Analysis, CueEdit, SimilarityEdge, SetSession,
//! and the Job Scheduler's event/state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content hash identifying a track independent of its path.
pub type ContentHash = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub content_hash: ContentHash,
    pub path: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CuePoint {
    pub cue_index: i64,
    pub beat_index: i64,
    pub cue_type: CueType,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CueType {
    Load,
    FirstDownbeat,
    Drop,
    FadeIn,
    FadeOut,
    Loop,
    Other,
}

impl CueType {
    /// Fallback label for a cue with no user-supplied `label`, used by every
    /// vendor exporter so an unlabeled cue still renders a name.
    pub fn display_name(self) -> &'static str {
        match self {
            CueType::Load => "Load",
            CueType::FirstDownbeat => "First Downbeat",
            CueType::Drop => "Drop",
            CueType::FadeIn => "Fade In",
            CueType::FadeOut => "Fade Out",
            CueType::Loop => "Loop",
            CueType::Other => "Cue",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub start: f64,
    pub end: f64,
    pub label: Option<String>,
}

/// A versioned analysis of a track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub content_hash: ContentHash,
    pub version: i64,
    pub status: AnalysisStatus,
    pub duration: f64,
    pub bpm: Option<f64>,
    pub bpm_confidence: Option<f64>,
    pub key: Option<String>,
    pub key_confidence: Option<f64>,
    pub energy: Option<u8>,
    pub integrated_loudness: Option<f64>,
    pub true_peak: Option<f64>,
    pub loudness_range: Option<f64>,
    pub beatgrid: Vec<f64>,
    pub sections: Vec<Section>,
    pub cue_points: Vec<CuePoint>,
    pub embedding: Option<Vec<f32>>,
    pub openl3_embedding: Option<Vec<f32>>,
}

impl Analysis {
    /// Beat times must be strictly monotonic and every cue must fall within range.
    pub fn validate_invariants(&self) -> Result<(), String> {
        for pair in self.beatgrid.windows(2) {
            if pair[1] <= pair[0] {
                return Err("beat times must be strictly monotonic".into());
            }
        }
        let max_beat = self.beatgrid.len().saturating_sub(1) as i64;
        for cue in &self.cue_points {
            if cue.beat_index < 0 || cue.beat_index > max_beat {
                return Err(format!(
                    "cue beat_index {} out of range [0, {}]",
                    cue.beat_index, max_beat
                ));
            }
        }
        for section in &self.sections {
            if !(section.start < section.end
                && section.start >= 0.0
                && section.end <= self.duration)
            {
                return Err(format!(
                    "section [{}, {}] invalid for duration {}",
                    section.start, section.end, self.duration
                ));
            }
        }
        if self.cue_points.len() > 8 {
            return Err("at most 8 cue points permitted".into());
        }
        Ok(())
    }
}

/// User override for a single cue index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CueEdit {
    pub content_hash: ContentHash,
    pub cue_index: i64,
    pub beat_index: i64,
    pub cue_type: CueType,
    pub label: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Overlay CueEdits onto an Analysis's auto cues, keyed by cue_index, with
/// user edits winning.
pub fn effective_cues(auto_cues: &[CuePoint], edits: &[CueEdit]) -> Vec<CuePoint> {
    use std::collections::BTreeMap;
    let mut by_index: BTreeMap<i64, CuePoint> = auto_cues
        .iter()
        .cloned()
        .map(|c| (c.cue_index, c))
        .collect();
    for edit in edits {
        by_index.insert(
            edit.cue_index,
            CuePoint {
                cue_index: edit.cue_index,
                beat_index: edit.beat_index,
                cue_type: edit.cue_type,
                label: edit.label.clone(),
            },
        );
    }
    by_index.into_values().collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyRelation {
    Same,
    Relative,
    Compatible,
    Harmonic,
    Clash,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityEdge {
    pub track_a: ContentHash,
    pub track_b: ContentHash,
    pub combined_score: f64,
    pub openl3: f64,
    pub tempo: f64,
    pub key: f64,
    pub energy: f64,
    pub key_relation: KeyRelation,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SetMode {
    WarmUp,
    PeakTime,
    OpenFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSession {
    pub name: String,
    pub tracks: Vec<ContentHash>,
    pub mode: SetMode,
    pub edges: Vec<SimilarityEdge>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Job Scheduler
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Enqueued,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed | JobState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    ScannerDriven,
    ExplicitReanalyze,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub content_hash: ContentHash,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: uuid::Uuid,
    pub track: ContentHash,
    pub version: i64,
    pub state: JobState,
    pub attempt: u32,
    pub reason: Option<String>,
    pub duration_ms: Option<u64>,
}
