//! Generic bundle: the vendor-neutral artifacts every export produces
//! regardless of which DJ software files were also requested.

use super::{display_name, effective_cues, ExportTrack};
use djprep_common::Result;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;

pub fn write_generic_bundle(out_dir: &Path, tracks: &[ExportTrack]) -> Result<Vec<String>> {
    write_playlist_m3u8(out_dir, tracks)?;
    write_analysis_json(out_dir, tracks)?;
    write_cues_csv(out_dir, tracks)?;
    Ok(vec![
        "playlist.m3u8".to_string(),
        "analysis.json".to_string(),
        "cues.csv".to_string(),
    ])
}

fn write_playlist_m3u8(out_dir: &Path, tracks: &[ExportTrack]) -> Result<()> {
    let mut body = String::new();
    body.push('\u{feff}');
    body.push_str("#EXTM3U\n");
    for t in tracks {
        let duration = t.analysis.duration.round() as i64;
        body.push_str(&format!("#EXTINF:{duration},{}\n", display_name(&t.track)));
        body.push_str(&t.track.path);
        body.push('\n');
    }
    std::fs::write(out_dir.join("playlist.m3u8"), body.as_bytes())?;
    Ok(())
}

/// Canonical, stable field order; BPM at 2 decimals, times at 3 decimals
/// hand-built rather than via `Analysis`'s own
/// `Serialize` impl so field order and numeric precision are pinned
/// independent of struct field order or serde_json's default float
/// formatting.
fn write_analysis_json(out_dir: &Path, tracks: &[ExportTrack]) -> Result<()> {
    let mut entries = Vec::with_capacity(tracks.len());
    for t in tracks {
        let a = &t.analysis;
        let cues: Vec<String> = effective_cues(t)
            .iter()
            .map(|c| {
                let time = c
                    .beat_index
                    .try_into()
                    .ok()
                    .and_then(|i: usize| a.beatgrid.get(i))
                    .copied()
                    .unwrap_or(0.0);
                format!(
                    r#"{{"cue_index":{},"beat_index":{},"time_seconds":{:.3},"type":{},"label":{}}}"#,
                    c.cue_index,
                    c.beat_index,
                    time,
                    json_string(&format!("{:?}", c.cue_type).to_lowercase()),
                    json_opt_string(&c.label)
                )
            })
            .collect();

        entries.push(format!(
            concat!(
                "{{",
                r#""content_hash":{},"#,
                r#""path":{},"#,
                r#""duration":{:.3},"#,
                r#""bpm":{},"#,
                r#""key":{},"#,
                r#""energy":{},"#,
                r#""cues":[{}]"#,
                "}}"
            ),
            json_string(&a.content_hash),
            json_string(&t.track.path),
            a.duration,
            json_opt_num_2(a.bpm),
            json_opt_string(&a.key),
            a.energy.map(|e| e.to_string()).unwrap_or_else(|| "null".into()),
            cues.join(","),
        ));
    }

    let body = format!("[\n  {}\n]\n", entries.join(",\n  "));
    std::fs::write(out_dir.join("analysis.json"), body.as_bytes())?;
    Ok(())
}

fn json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn json_opt_string(s: &Option<String>) -> String {
    match s {
        Some(s) => json_string(s),
        None => "null".to_string(),
    }
}

fn json_opt_num_2(n: Option<f64>) -> String {
    match n {
        Some(n) => format!("{n:.2}"),
        None => "null".to_string(),
    }
}

fn write_cues_csv(out_dir: &Path, tracks: &[ExportTrack]) -> Result<()> {
    let mut body = String::from("track,cue_index,beat_index,time_seconds,type,label\n");
    for t in tracks {
        for cue in effective_cues(t) {
            let time = usize::try_from(cue.beat_index)
                .ok()
                .and_then(|i| t.analysis.beatgrid.get(i))
                .copied()
                .unwrap_or(0.0);
            let cue_type = format!("{:?}", cue.cue_type).to_lowercase();
            let label = cue.label.as_deref().unwrap_or("");
            body.push_str(&format!(
                "{},{},{},{:.3},{},{}\n",
                csv_field(&t.analysis.content_hash),
                cue.cue_index,
                cue.beat_index,
                time,
                cue_type,
                csv_field(label),
            ));
        }
    }
    std::fs::write(out_dir.join("cues.csv"), body.as_bytes())?;
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// `checksums.txt`: one `SHA-256<two spaces>filename` line per artifact,
/// sorted by filename for determinism.
pub fn write_checksums(out_dir: &Path, artifacts: &[String]) -> Result<()> {
    let mut body = String::new();
    for name in artifacts {
        let bytes = std::fs::read(out_dir.join(name))?;
        let digest = Sha256::digest(&bytes);
        body.push_str(&format!("{digest:x}  {name}\n"));
    }
    std::fs::write(out_dir.join("checksums.txt"), body.as_bytes())?;
    Ok(())
}

/// Deterministic tarball: sorted entries, zeroed mtimes, fixed uid/gid
/// so the same artifact set always produces
/// byte-identical `bundle.tar.gz`.
pub fn write_deterministic_tarball(out_dir: &Path, artifacts: &[String]) -> Result<()> {
    let tar_path = out_dir.join("bundle.tar.gz");
    let file = std::fs::File::create(&tar_path)?;
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut sorted = artifacts.to_vec();
    sorted.sort();
    for name in &sorted {
        let bytes = std::fs::read(out_dir.join(name))?;
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_cksum();
        builder.append_data(&mut header, name, bytes.as_slice())?;
    }

    let encoder = builder.into_inner()?;
    let mut file = encoder.finish()?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Analysis, AnalysisStatus, CuePoint, CueType, Track};
    use chrono::Utc;

    fn sample_track() -> ExportTrack {
        ExportTrack {
            track: Track {
                content_hash: "H1".into(),
                path: "/music/a.wav".into(),
                size: 1000,
                mtime: Utc::now(),
                title: Some("Title".into()),
                artist: Some("Artist".into()),
                album: None,
            },
            analysis: Analysis {
                content_hash: "H1".into(),
                version: 1,
                status: AnalysisStatus::Complete,
                duration: 180.4,
                bpm: Some(128.0),
                bpm_confidence: Some(0.9),
                key: Some("8A".into()),
                key_confidence: Some(0.9),
                energy: Some(6),
                integrated_loudness: None,
                true_peak: None,
                loudness_range: None,
                beatgrid: vec![0.0, 0.5, 1.0, 1.5],
                sections: vec![],
                cue_points: vec![CuePoint {
                    cue_index: 0,
                    beat_index: 1,
                    cue_type: CueType::Drop,
                    label: Some("drop".into()),
                }],
                embedding: None,
                openl3_embedding: None,
            },
            cue_edits: vec![],
        }
    }

    #[test]
    fn playlist_m3u8_carries_a_bom_and_extinf_line() {
        let dir = tempfile::tempdir().unwrap();
        write_playlist_m3u8(dir.path(), &[sample_track()]).unwrap();
        let body = std::fs::read(dir.path().join("playlist.m3u8")).unwrap();
        assert_eq!(&body[..3], [0xEF, 0xBB, 0xBF]);
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("#EXTINF:180,Artist – Title"));
    }

    #[test]
    fn cues_csv_has_the_required_header_and_one_row_per_cue() {
        let dir = tempfile::tempdir().unwrap();
        write_cues_csv(dir.path(), &[sample_track()]).unwrap();
        let text = std::fs::read_to_string(dir.path().join("cues.csv")).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "track,cue_index,beat_index,time_seconds,type,label"
        );
        assert_eq!(lines.next().unwrap(), "H1,0,1,0.500,drop,drop");
    }

    #[test]
    fn checksums_file_matches_written_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = write_generic_bundle(dir.path(), &[sample_track()]).unwrap();
        write_checksums(dir.path(), &artifacts).unwrap();
        let text = std::fs::read_to_string(dir.path().join("checksums.txt")).unwrap();
        assert_eq!(text.lines().count(), artifacts.len());
        assert!(text.lines().all(|l| l.contains("  ")));
    }

    #[test]
    fn tarball_round_trips_through_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifacts = write_generic_bundle(dir.path(), &[sample_track()]).unwrap();
        write_checksums(dir.path(), &artifacts).unwrap();
        artifacts.push("checksums.txt".to_string());
        write_deterministic_tarball(dir.path(), &artifacts).unwrap();
        let bytes = std::fs::read(dir.path().join("bundle.tar.gz")).unwrap();
        let decoder = flate2::read::GzDecoder::new(bytes.as_slice());
        let mut archive = tar::Archive::new(decoder);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), artifacts.len());
    }
}
