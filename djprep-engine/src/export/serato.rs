//! Serato `_Serato_<name>.crate` exporter: big-endian binary chunks,
//! UTF-16BE track paths. Chunk framing (4-byte ASCII tag + u32 big-endian
//! length) and the UTF-16BE string encoding follow the same marker +
//! length-prefixed-string shape as StageLinQ's wire protocol.

use super::cue_colors::color_for;
use super::{effective_cues, ExportTrack};
use byteorder::{BigEndian, WriteBytesExt};
use djprep_common::Result;
use std::path::Path;

const CUES_CHUNK_VERSION: u8 = 0x02;

fn write_utf16_be(buf: &mut Vec<u8>, s: &str) {
    for unit in s.encode_utf16() {
        buf.write_u16::<BigEndian>(unit).unwrap();
    }
}

fn write_chunk(buf: &mut Vec<u8>, tag: &[u8; 4], body: &[u8]) {
    buf.extend_from_slice(tag);
    buf.write_u32::<BigEndian>(body.len() as u32).unwrap();
    buf.extend_from_slice(body);
}

/// Per-track `otrk` entry: a `ptrk` sub-chunk holding the UTF-16BE path,
/// followed by a supplementary cues chunk: version byte, count byte,
/// then one record per cue (index, position in ms as a big-endian u32,
/// RGB).
fn track_entry(t: &ExportTrack) -> Vec<u8> {
    let mut path_body = Vec::new();
    write_utf16_be(&mut path_body, &t.track.path);

    let mut track_body = Vec::new();
    write_chunk(&mut track_body, b"ptrk", &path_body);

    let cues = effective_cues(t);
    let mut cues_body = Vec::new();
    cues_body.push(CUES_CHUNK_VERSION);
    cues_body.push(cues.len().min(u8::MAX as usize) as u8);
    for cue in &cues {
        let position_ms = usize::try_from(cue.beat_index)
            .ok()
            .and_then(|i| t.analysis.beatgrid.get(i))
            .map(|seconds| (seconds * 1000.0).round() as u32)
            .unwrap_or(0);
        let (r, g, b) = color_for(cue.cue_type);

        cues_body
            .write_u8(cue.cue_index.clamp(0, u8::MAX as i64) as u8)
            .unwrap();
        cues_body.write_u32::<BigEndian>(position_ms).unwrap();
        cues_body.push(r);
        cues_body.push(g);
        cues_body.push(b);
    }
    write_chunk(&mut track_body, b"cues", &cues_body);

    let mut entry = Vec::new();
    write_chunk(&mut entry, b"otrk", &track_body);
    entry
}

pub fn write(path: &Path, tracks: &[ExportTrack]) -> Result<()> {
    let mut buf = Vec::new();
    for t in tracks {
        buf.extend_from_slice(&track_entry(t));
    }
    std::fs::write(path, buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Analysis, AnalysisStatus, CuePoint, CueType, Track};
    use byteorder::ReadBytesExt;
    use chrono::Utc;
    use std::io::{Cursor, Read};

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
                bpm_confidence: None,
                key: Some("8A".into()),
                key_confidence: None,
                energy: Some(6),
                integrated_loudness: None,
                true_peak: None,
                loudness_range: None,
                beatgrid: vec![0.0, 0.5, 1.0, 1.5],
                sections: vec![],
                cue_points: vec![CuePoint {
                    cue_index: 0,
                    beat_index: 2,
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
    fn track_entry_round_trips_path_and_cue_position() {
        let entry = track_entry(&sample_track());
        let mut cursor = Cursor::new(entry.as_slice());

        let mut tag = [0u8; 4];
        cursor.read_exact(&mut tag).unwrap();
        assert_eq!(&tag, b"otrk");
        let _len = cursor.read_u32::<BigEndian>().unwrap();

        let mut ptrk_tag = [0u8; 4];
        cursor.read_exact(&mut ptrk_tag).unwrap();
        assert_eq!(&ptrk_tag, b"ptrk");
        let path_len = cursor.read_u32::<BigEndian>().unwrap() as usize;
        let mut path_bytes = vec![0u8; path_len];
        cursor.read_exact(&mut path_bytes).unwrap();
        let units: Vec<u16> = path_bytes
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(String::from_utf16(&units).unwrap(), "/music/a.wav");

        let mut cues_tag = [0u8; 4];
        cursor.read_exact(&mut cues_tag).unwrap();
        assert_eq!(&cues_tag, b"cues");
        let _cues_len = cursor.read_u32::<BigEndian>().unwrap();
        assert_eq!(cursor.read_u8().unwrap(), CUES_CHUNK_VERSION);
        assert_eq!(cursor.read_u8().unwrap(), 1);
        assert_eq!(cursor.read_u8().unwrap(), 0); // cue index
        assert_eq!(cursor.read_u32::<BigEndian>().unwrap(), 1000); // beat 2 -> 1.0s -> 1000ms
    }
}
