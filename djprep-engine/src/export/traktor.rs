//! Traktor `collection.nml` exporter (NML v19): tracks referenced via
//! the `/:`-escaped path form, `CUE_V2` entries in milliseconds, Camelot
//! keys mapped through a fixed 0-23 index table.

use super::cue_colors::rekordbox_type;
use super::{effective_cues, ExportTrack};
use djprep_common::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

/// Camelot wheel position (1-12) and mode (A=minor, B=major) to
/// Traktor's musical-key index (0-23, chromatic, minor keys first).
/// Traktor's own table runs `8B -> 0` (C major) chromatically upward;
/// this follows the same chromatic ordering rather than the Camelot
/// wheel's own numbering, since the two wheels start from different
/// reference keys. Not spelled out anywhere publicly as a single
/// canonical table, so this is a documented decision rather than a
/// verified fact.
fn camelot_to_traktor(key: &str) -> Option<u8> {
    let key = key.trim();
    let letter = key.chars().last()?.to_ascii_uppercase();
    let number: u8 = key[..key.len() - 1].parse().ok()?;
    if !(1..=12).contains(&number) || (letter != 'A' && letter != 'B') {
        return None;
    }
    // 8B (C major) is index 0; major keys occupy 0-11 going clockwise
    // around the Camelot wheel, minor keys occupy 12-23 the same way.
    let wheel_offset = (number + 12 - 8) % 12;
    let base = if letter == 'B' { 0 } else { 12 };
    Some(base + wheel_offset)
}

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

    let mut root = BytesStart::new("NML");
    root.push_attribute(("VERSION", "19"));
    writer.write_event(Event::Start(root)).map_err(std::io::Error::other)?;

    writer
        .create_element("COLLECTION")
        .with_attribute(("ENTRIES", tracks.len().to_string().as_str()))
        .write_inner_content(|w| {
            for t in tracks {
                write_entry(w, t)?;
            }
            Ok(())
        })?;

    writer.write_event(Event::End(BytesEnd::new("NML"))).map_err(std::io::Error::other)?;
    Ok(writer.into_inner().into_inner())
}

fn write_entry(
    w: &mut Writer<Cursor<Vec<u8>>>,
    t: &ExportTrack,
) -> std::io::Result<()> {
    let a = &t.analysis;
    let location = format!("/:file://localhost/:{}", escape_path(&t.track.path));

    let mut entry = BytesStart::new("ENTRY");
    entry.push_attribute(("TITLE", t.track.title.as_deref().unwrap_or("")));
    entry.push_attribute(("ARTIST", t.track.artist.as_deref().unwrap_or("")));
    w.write_event(Event::Start(entry)).map_err(std::io::Error::other)?;

    let mut location_el = BytesStart::new("LOCATION");
    location_el.push_attribute(("DIR", location.as_str()));
    location_el.push_attribute(("FILE", ""));
    w.write_event(Event::Empty(location_el)).map_err(std::io::Error::other)?;

    let mut info = BytesStart::new("INFO");
    info.push_attribute(("PLAYTIME", format!("{}", a.duration.round() as i64).as_str()));
    if let Some(key) = &a.key {
        if let Some(index) = camelot_to_traktor(key) {
            info.push_attribute(("KEY", index.to_string().as_str()));
        }
    }
    w.write_event(Event::Empty(info)).map_err(std::io::Error::other)?;

    if let Some(bpm) = a.bpm {
        let mut tempo = BytesStart::new("TEMPO");
        tempo.push_attribute(("BPM", format!("{bpm:.2}").as_str()));
        tempo.push_attribute(("BPM_QUALITY", "100.000000"));
        w.write_event(Event::Empty(tempo)).map_err(std::io::Error::other)?;
    }

    for cue in effective_cues(t) {
        let time_ms = usize::try_from(cue.beat_index)
            .ok()
            .and_then(|i| a.beatgrid.get(i))
            .map(|seconds| seconds * 1000.0)
            .unwrap_or(0.0);

        let name = cue.label.clone().unwrap_or_else(|| cue.cue_type.display_name().to_string());
        let mut cue_el = BytesStart::new("CUE_V2");
        cue_el.push_attribute(("NAME", name.as_str()));
        cue_el.push_attribute(("DISPL_ORDER", cue.cue_index.to_string().as_str()));
        cue_el.push_attribute(("TYPE", rekordbox_type(cue.cue_type).to_string().as_str()));
        cue_el.push_attribute(("START", format!("{time_ms:.3}").as_str()));
        cue_el.push_attribute(("LEN", "0.000000"));
        cue_el.push_attribute(("REPEATS", "-1"));
        cue_el.push_attribute(("HOTCUE", cue.cue_index.to_string().as_str()));
        w.write_event(Event::Empty(cue_el)).map_err(std::io::Error::other)?;
    }

    w.write_event(Event::End(BytesEnd::new("ENTRY"))).map_err(std::io::Error::other)?;
    Ok(())
}

fn escape_path(path: &str) -> String {
    path.replace('/', "/:")
}
