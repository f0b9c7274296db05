//! Cue-type → RGB color table: shared across all three
//! vendor exporters so a cue always renders the same color regardless of
//! target software. Bumping this table is an exporter schema version
//! bump, since it changes every exporter's bit-exact output.

use crate::model::CueType;

pub const EXPORTER_SCHEMA_VERSION: u8 = 1;

/// `(r, g, b)`.
pub fn color_for(cue_type: CueType) -> (u8, u8, u8) {
    match cue_type {
        CueType::Load => (0x00, 0xAA, 0xFF),
        CueType::FirstDownbeat => (0xFF, 0xFF, 0x00),
        CueType::Drop => (0xE6, 0x14, 0x14),
        CueType::FadeIn => (0x00, 0xFF, 0x00),
        CueType::FadeOut => (0xFF, 0x88, 0x00),
        CueType::Loop => (0xCC, 0x00, 0xFF),
        CueType::Other => (0x88, 0x88, 0x88),
    }
}

/// Rekordbox `POSITION_MARK`/`CUE_V2` numeric type codes.
pub fn rekordbox_type(cue_type: CueType) -> u8 {
    match cue_type {
        CueType::FadeIn => 1,
        CueType::FadeOut => 2,
        CueType::Loop => 4,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_cue_type_has_a_distinct_color() {
        let types = [
            CueType::Load,
            CueType::FirstDownbeat,
            CueType::Drop,
            CueType::FadeIn,
            CueType::FadeOut,
            CueType::Loop,
            CueType::Other,
        ];
        let mut colors: Vec<(u8, u8, u8)> = types.iter().map(|t| color_for(*t)).collect();
        colors.sort();
        colors.dedup();
        assert_eq!(colors.len(), types.len());
    }
}
