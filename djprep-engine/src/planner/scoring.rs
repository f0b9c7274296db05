//! Edge scoring: four weighted components normalized to
//! `[0, 1]` and summed, then scaled to `[0, 10]`.

use crate::model::{Analysis, KeyRelation, SetMode};
use crate::planner::{PlanConstraints, PlannedEdge};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EdgeComponents {
    pub vibe: f64,
    pub tempo: f64,
    pub key: f64,
    pub energy: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeWeights {
    pub vibe: f64,
    pub tempo: f64,
    pub key: f64,
    pub energy: f64,
}

impl EdgeWeights {
    /// Default weights are mode-independent; only the energy component's
    /// shape (not its weight) varies by mode.
    pub fn for_mode(_mode: SetMode) -> Self {
        Self {
            vibe: 0.50,
            tempo: 0.20,
            key: 0.20,
            energy: 0.10,
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

fn vibe_component(a: &Analysis, b: &Analysis) -> f64 {
    let pair = a
        .openl3_embedding
        .as_ref()
        .zip(b.openl3_embedding.as_ref())
        .or_else(|| a.embedding.as_ref().zip(b.embedding.as_ref()));

    match pair {
        Some((ea, eb)) => match cosine_similarity(ea, eb) {
            Some(cos) => (cos + 1.0) / 2.0,
            None => 0.5,
        },
        None => 0.5,
    }
}

/// `Δbpm` is signed (`a - b`, octave-normalized): its magnitude is the
/// smallest of the raw difference and the half/double-tempo differences, so
/// 64 vs 128 BPM reads as near-perfect, and its sign is inherited from
/// whichever of those three candidates won, so direction survives alongside
/// magnitude (`A→B` and `B→A` report opposite signs).
fn tempo_delta(bpm_a: f64, bpm_b: f64) -> f64 {
    let raw = bpm_a - bpm_b;
    let half = bpm_a - bpm_b / 2.0;
    let double = bpm_a - bpm_b * 2.0;
    [raw, half, double]
        .into_iter()
        .min_by(|x, y| x.abs().partial_cmp(&y.abs()).unwrap())
        .unwrap()
}

fn tempo_component(delta: f64, max_bpm_step: f64) -> f64 {
    let delta = delta.abs();
    if delta <= 1.0 {
        1.0
    } else if delta >= max_bpm_step {
        0.0
    } else {
        1.0 - (delta - 1.0) / (max_bpm_step - 1.0)
    }
}

/// Parses a Camelot key (`"8A"`, `"12B"`) into `(wheel position, mode)`.
fn parse_camelot(key: &str) -> Option<(u8, char)> {
    let key = key.trim();
    let letter = key.chars().last()?.to_ascii_uppercase();
    if letter != 'A' && letter != 'B' {
        return None;
    }
    let number: u8 = key[..key.len() - 1].parse().ok()?;
    if !(1..=12).contains(&number) {
        return None;
    }
    Some((number, letter))
}

fn circular_distance(a: u8, b: u8) -> u8 {
    let diff = (a as i16 - b as i16).abs() as u8;
    diff.min(12 - diff)
}

fn key_relation(key_a: Option<&str>, key_b: Option<&str>) -> (KeyRelation, f64) {
    let (Some(a), Some(b)) = (key_a, key_b) else {
        return (KeyRelation::Unknown, 0.5);
    };
    let (Some((num_a, mode_a)), Some((num_b, mode_b))) = (parse_camelot(a), parse_camelot(b))
    else {
        return (KeyRelation::Unknown, 0.5);
    };

    if num_a == num_b && mode_a == mode_b {
        return (KeyRelation::Same, 1.0);
    }
    if num_a == num_b && mode_a != mode_b {
        return (KeyRelation::Relative, 0.9);
    }

    let distance = circular_distance(num_a, num_b);
    if distance == 1 && mode_a == mode_b {
        return (KeyRelation::Compatible, 0.85);
    }
    if distance == 2 {
        return (KeyRelation::Harmonic, 0.5);
    }
    (KeyRelation::Clash, 0.2)
}

/// Energy component with a mode-dependent asymmetric penalty: drops cost more than rises in `warm_up`; rises are cheap
/// below a target ceiling in `peak_time`; `open_format` is symmetric.
fn energy_component(energy_a: Option<u8>, energy_b: Option<u8>, mode: SetMode) -> f64 {
    let (Some(a), Some(b)) = (energy_a, energy_b) else {
        return 0.5;
    };
    let delta = b as f64 - a as f64;
    let base = 1.0 - delta.abs() / 10.0;

    match mode {
        SetMode::WarmUp if delta < 0.0 => (base - delta.abs() / 10.0).max(0.0),
        SetMode::PeakTime if delta < 0.0 && b < 7 => (base - delta.abs() / 20.0).max(0.0),
        _ => base,
    }
}

/// Classifies the transition-window tag from each track's sections:
/// an outro-shaped tail on `a` meeting an intro-shaped head on `b` is
/// tagged `intro_outro`; a quiet final section is tagged `breakdown`;
/// otherwise untagged.
fn window_tag(a: &Analysis, b: &Analysis) -> String {
    let a_has_outro = a
        .sections
        .last()
        .map(|s| s.label.as_deref() == Some("outro"))
        .unwrap_or(false);
    let b_has_intro = b
        .sections
        .first()
        .map(|s| s.label.as_deref() == Some("intro"))
        .unwrap_or(false);

    if a_has_outro && b_has_intro {
        "intro_outro".to_string()
    } else if a
        .sections
        .last()
        .map(|s| s.label.as_deref() == Some("breakdown"))
        .unwrap_or(false)
    {
        "breakdown".to_string()
    } else {
        "untagged".to_string()
    }
}

struct ScoredPair {
    score: f64,
    components: EdgeComponents,
    relation: KeyRelation,
    delta: f64,
}

fn compute(
    a: &Analysis,
    b: &Analysis,
    mode: SetMode,
    weights: &EdgeWeights,
    constraints: &PlanConstraints,
) -> ScoredPair {
    let vibe = vibe_component(a, b);
    let delta = tempo_delta(a.bpm.unwrap_or(0.0), b.bpm.unwrap_or(0.0));
    let max_bpm_step = if constraints.max_bpm_step > 0.0 {
        constraints.max_bpm_step
    } else {
        16.0
    };
    let tempo = tempo_component(delta, max_bpm_step);
    let (relation, key_score) = key_relation(a.key.as_deref(), b.key.as_deref());
    let energy = energy_component(a.energy, b.energy, mode);

    let mut combined = weights.vibe * vibe
        + weights.tempo * tempo
        + weights.key * key_score
        + weights.energy * energy;

    let forbidden = constraints.banned.contains(&b.content_hash)
        || key_steps_exceeded(relation, constraints.max_key_steps)
        || delta.abs() >= max_bpm_step;
    if forbidden {
        combined = f64::NEG_INFINITY;
    }

    let score = if combined.is_finite() { combined * 10.0 } else { combined };

    ScoredPair {
        score,
        components: EdgeComponents {
            vibe,
            tempo,
            key: key_score,
            energy,
        },
        relation,
        delta,
    }
}

/// Scalar edge weight, `[0, 10]` or `-inf` when forbidden — used by the
/// solver, which only needs a number to optimize over.
pub(crate) fn edge_score(
    a: &Analysis,
    b: &Analysis,
    mode: SetMode,
    weights: &EdgeWeights,
    constraints: &PlanConstraints,
) -> f64 {
    compute(a, b, mode, weights, constraints).score
}

pub fn score_edge(
    a: &Analysis,
    b: &Analysis,
    mode: SetMode,
    weights: &EdgeWeights,
    constraints: &PlanConstraints,
) -> PlannedEdge {
    let scored = compute(a, b, mode, weights, constraints);

    PlannedEdge {
        from: a.content_hash.clone(),
        to: b.content_hash.clone(),
        score: scored.score,
        components: scored.components,
        key_relation: scored.relation,
        tempo_delta: scored.delta,
        window: window_tag(a, b),
        explanation: explain(
            scored.components.vibe,
            scored.components.tempo,
            scored.components.key,
            scored.components.energy,
            scored.relation,
            scored.delta,
        ),
    }
}

fn key_steps_exceeded(relation: KeyRelation, max_key_steps: u8) -> bool {
    match relation {
        KeyRelation::Clash => max_key_steps < 3,
        KeyRelation::Harmonic => max_key_steps < 2,
        _ => false,
    }
}

fn explain(vibe: f64, tempo: f64, key: f64, energy: f64, relation: KeyRelation, delta: f64) -> String {
    format!(
        "vibe {vibe:.2}, tempo {tempo:.2} (Δbpm {delta:+.1}), key {key:.2} ({relation:?}), energy {energy:.2}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_key_match_scores_one() {
        let (relation, score) = key_relation(Some("8A"), Some("8A"));
        assert_eq!(relation, KeyRelation::Same);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn relative_major_minor_scores_point_nine() {
        let (relation, score) = key_relation(Some("8A"), Some("8B"));
        assert_eq!(relation, KeyRelation::Relative);
        assert_eq!(score, 0.9);
    }

    #[test]
    fn half_and_double_tempo_are_treated_as_near_identical() {
        let delta = tempo_delta(64.0, 128.0);
        assert!(delta.abs() <= 1.0);
    }

    #[test]
    fn tempo_delta_sign_reflects_direction_and_flips_on_reversal() {
        let a_to_b = tempo_delta(128.0, 126.0);
        let b_to_a = tempo_delta(126.0, 128.0);
        assert_eq!(a_to_b, 2.0);
        assert_eq!(b_to_a, -2.0);
    }

    #[test]
    fn unknown_key_falls_back_to_midpoint_score() {
        let (relation, score) = key_relation(None, Some("8A"));
        assert_eq!(relation, KeyRelation::Unknown);
        assert_eq!(score, 0.5);
    }

    #[test]
    fn vibe_without_any_embedding_falls_back_to_midpoint() {
        let analysis = |hash: &str| Analysis {
            content_hash: hash.into(),
            version: 1,
            status: crate::model::AnalysisStatus::Complete,
            duration: 200.0,
            bpm: Some(128.0),
            bpm_confidence: None,
            key: None,
            key_confidence: None,
            energy: None,
            integrated_loudness: None,
            true_peak: None,
            loudness_range: None,
            beatgrid: vec![],
            sections: vec![],
            cue_points: vec![],
            embedding: None,
            openl3_embedding: None,
        };
        assert_eq!(vibe_component(&analysis("A"), &analysis("B")), 0.5);
    }
}
