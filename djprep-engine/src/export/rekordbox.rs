//! Rekordbox `rekordbox.xml` exporter: `DJ_PLAYLISTS` schema with
//! `TEMPO` markers and `POSITION_MARK` cue entries. Built with
//! quick-xml's event `Writer` directly, rather than derive-based
//! serialization, so field order, attribute casing, and numeric
//! formatting are pinned exactly to what Rekordbox's importer expects.

use super::cue_colors::{color_for, rekordbox_type};
use super::{display_name, effective_cues, ExportTrack};
use djprep_common::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

pub fn write(path: &Path, tracks: &[ExportTrack]) -> Result<()> {
    let bytes = render(tracks).map_err(|e| djprep_common::Error::Internal(e.to_string()))?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn render(tracks: &[ExportTrack]) -> std::io::Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(std::io::Error::other)?;

    writer
        .create_element("DJ_PLAYLISTS")
        .with_attribute(("Version", "1.0.0"))
        .write_inner_content(|w| {
            w.create_element("PRODUCT")
                .with_attribute(("Name", "djprep"))
                .with_attribute(("Version", "1.0"))
                .with_attribute(("Company", "djprep"))
                .write_empty()
                .map_err(std::io::Error::other)?;

            w.create_element("COLLECTION")
                .with_attribute(("Entries", tracks.len().to_string().as_str()))
                .write_inner_content(|w| {
                    for (idx, t) in tracks.iter().enumerate() {
                        write_track(w, idx as u32 + 1, t)?;
                    }
                    Ok(())
                })?;
            Ok(())
        })?;

    Ok(writer.into_inner().into_inner())
}

fn write_track(
    w: &mut Writer<Cursor<Vec<u8>>>,
    track_id: u32,
    t: &ExportTrack,
) -> std::io::Result<()> {
    let a = &t.analysis;
    let location = format!("file://localhost{}", url_escape(&t.track.path));

    let mut start = BytesStart::new("TRACK");
    start.push_attribute(("TrackID", track_id.to_string().as_str()));
    start.push_attribute(("Name", display_name(&t.track).as_str()));
    start.push_attribute(("Artist", t.track.artist.as_deref().unwrap_or("")));
    start.push_attribute(("Album", t.track.album.as_deref().unwrap_or("")));
    start.push_attribute(("TotalTime", format!("{}", a.duration.round() as i64).as_str()));
    if let Some(bpm) = a.bpm {
        start.push_attribute(("AverageBpm", format!("{bpm:.2}").as_str()));
    }
    if let Some(key) = &a.key {
        start.push_attribute(("Tonality", key.as_str()));
    }
    start.push_attribute(("Location", location.as_str()));
    w.write_event(Event::Start(start)).map_err(std::io::Error::other)?;

    if let Some(bpm) = a.bpm {
        let mut tempo = BytesStart::new("TEMPO");
        tempo.push_attribute(("Inizio", "0.000"));
        tempo.push_attribute(("Bpm", format!("{bpm:.2}").as_str()));
        tempo.push_attribute(("Metro", "4/4"));
        tempo.push_attribute(("Battito", "1"));
        w.write_event(Event::Empty(tempo)).map_err(std::io::Error::other)?;
    }

    for cue in effective_cues(t) {
        let time = usize::try_from(cue.beat_index)
            .ok()
            .and_then(|i| a.beatgrid.get(i))
            .copied()
            .unwrap_or(0.0);
        let (r, g, b) = color_for(cue.cue_type);

        let name = cue.label.clone().unwrap_or_else(|| cue.cue_type.display_name().to_string());
        let mut mark = BytesStart::new("POSITION_MARK");
        mark.push_attribute(("Name", name.as_str()));
        mark.push_attribute(("Type", rekordbox_type(cue.cue_type).to_string().as_str()));
        mark.push_attribute(("Start", format!("{time:.3}").as_str()));
        mark.push_attribute(("Num", cue.cue_index.to_string().as_str()));
        mark.push_attribute(("Red", r.to_string().as_str()));
        mark.push_attribute(("Green", g.to_string().as_str()));
        mark.push_attribute(("Blue", b.to_string().as_str()));
        w.write_event(Event::Empty(mark)).map_err(std::io::Error::other)?;
    }

    w.write_event(Event::End(BytesEnd::new("TRACK"))).map_err(std::io::Error::other)?;
    Ok(())
}

fn url_escape(path: &str) -> String {
    path.replace(' ', "%20")
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
    fn writes_a_track_with_tempo_and_position_mark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rekordbox.xml");
        write(&path, &[sample_track()]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("DJ_PLAYLISTS"));
        assert!(text.contains("AverageBpm=\"128.00\""));
        assert!(text.contains("POSITION_MARK"));
        assert!(text.contains("Start=\"0.500\""));
    }
}
