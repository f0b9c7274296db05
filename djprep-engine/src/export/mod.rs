//! Exporter Suite: a generic bundle (always produced) plus bit-exact
//! vendor files chosen per request. Every exporter reads from a
//! consistent, already-fetched snapshot of tracks and analyses; none of
//! them touch the Metadata Store.

pub mod bundle;
pub mod cue_colors;
pub mod rekordbox;
pub mod serato;
pub mod traktor;
pub mod verify;

use crate::model::{Analysis, CueEdit, Track};
use chrono::{DateTime, Utc};
use djprep_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Generic,
    Rekordbox,
    Serato,
    Traktor,
}

/// One track plus its effective cues (auto cues overlaid with CueEdits),
/// the unit every exporter operates on.
pub struct ExportTrack {
    pub track: Track,
    pub analysis: Analysis,
    pub cue_edits: Vec<CueEdit>,
}

pub struct ExportRequest {
    pub playlist_name: String,
    pub tracks: Vec<ExportTrack>,
    pub formats: Vec<ExportFormat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub bundle_path: PathBuf,
    pub artifacts: Vec<String>,
}

/// Runs the full export: always writes the generic bundle, then any
/// vendor files the request asks for, under
/// `exports/<timestamp>-<name>/`, finally
/// writing `checksums.txt` over everything produced and `bundle.tar.gz`
/// over the whole directory.
pub fn export(output_root: &Path, request: &ExportRequest, now: DateTime<Utc>) -> Result<ExportResult> {
    if request.tracks.is_empty() {
        return Err(Error::InvalidInput("export request has no tracks".into()));
    }

    let dir_name = format!(
        "{}-{}",
        now.format("%Y%m%dT%H%M%SZ"),
        sanitize_name(&request.playlist_name)
    );
    let out_dir = output_root.join(dir_name);
    std::fs::create_dir_all(&out_dir)?;

    let mut artifacts = bundle::write_generic_bundle(&out_dir, &request.tracks)?;

    for format in &request.formats {
        match format {
            ExportFormat::Generic => {}
            ExportFormat::Rekordbox => {
                let name = "rekordbox.xml".to_string();
                rekordbox::write(&out_dir.join(&name), &request.tracks)?;
                artifacts.push(name);
            }
            ExportFormat::Serato => {
                let name = format!("_Serato_{}.crate", sanitize_name(&request.playlist_name));
                serato::write(&out_dir.join(&name), &request.tracks)?;
                artifacts.push(name);
            }
            ExportFormat::Traktor => {
                let name = "collection.nml".to_string();
                traktor::write(&out_dir.join(&name), &request.tracks)?;
                artifacts.push(name);
            }
        }
    }

    artifacts.sort();
    bundle::write_checksums(&out_dir, &artifacts)?;
    artifacts.push("checksums.txt".to_string());

    bundle::write_deterministic_tarball(&out_dir, &artifacts)?;

    Ok(ExportResult {
        bundle_path: out_dir,
        artifacts,
    })
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Effective cues for an export track: auto cues from its Analysis with
/// CueEdits overlaid.
pub(crate) fn effective_cues(track: &ExportTrack) -> Vec<crate::model::CuePoint> {
    crate::model::effective_cues(&track.analysis.cue_points, &track.cue_edits)
}

pub(crate) fn display_name(track: &Track) -> String {
    match (&track.artist, &track.title) {
        (Some(artist), Some(title)) => format!("{artist} – {title}"),
        (None, Some(title)) => title.clone(),
        _ => track
            .path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&track.path)
            .to_string(),
    }
}
