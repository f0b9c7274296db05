//! Path solvers: exact Held-Karp dynamic programming for
//! small candidate sets, seeded greedy + 2-opt local search above that.

use crate::model::{Analysis, SetMode};
use crate::planner::scoring::{edge_score, EdgeWeights};
use crate::planner::{PlanConstraints, EXACT_SOLVE_LIMIT};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::fmt;

/// An infeasible plan request, with a stable `reason` code callers can
/// match on and a human-readable `message` for logs/UI.
#[derive(Debug, Clone)]
pub struct InfeasiblePlan {
    pub reason: &'static str,
    pub message: String,
}

impl InfeasiblePlan {
    pub(crate) fn new(reason: &'static str, message: impl Into<String>) -> Self {
        Self { reason, message: message.into() }
    }
}

impl fmt::Display for InfeasiblePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for InfeasiblePlan {}

const GREEDY_SEED_COUNT: usize = 5;

/// A run of candidate indices pinned together by `locked_edges`, in the
/// fixed order the lock requires. Every candidate belongs to exactly one
/// chain; a candidate with no locked edge is its own chain of length one.
type Chain = Vec<usize>;

pub fn solve(
    candidates: &[&Analysis],
    constraints: &PlanConstraints,
    mode: SetMode,
    weights: &EdgeWeights,
    seed: u64,
) -> Result<Vec<String>, InfeasiblePlan> {
    let chains = build_chains(candidates, &constraints.locked_edges)?;
    let n = chains.len();

    if n == 1 {
        return Ok(chains[0].iter().map(|&i| candidates[i].content_hash.clone()).collect());
    }

    let start_idx = chain_index_of(candidates, &chains, constraints.start_track.as_deref(), true)?;
    let end_idx = chain_index_of(candidates, &chains, constraints.end_track.as_deref(), false)?;

    let weight = |i: usize, j: usize| {
        let a = candidates[*chains[i].last().unwrap()];
        let b = candidates[*chains[j].first().unwrap()];
        edge_score(a, b, mode, weights, constraints)
    };

    let order_idx = if n <= EXACT_SOLVE_LIMIT {
        held_karp(n, start_idx, end_idx, &weight)
    } else {
        greedy_then_two_opt(n, start_idx, end_idx, &weight, seed)
    };

    let order_idx = order_idx.ok_or_else(|| {
        InfeasiblePlan::new(
            "no_valid_edge",
            format!("no feasible ordering of {n} chains satisfies the given constraints"),
        )
    })?;

    Ok(order_idx
        .into_iter()
        .flat_map(|c| chains[c].iter().map(|&i| candidates[i].content_hash.clone()))
        .collect())
}

/// Groups `candidates` into chains pinned by `locked_edges`. A track that
/// is the source of two locked edges, the target of two, or part of a
/// cycle makes the request infeasible.
fn build_chains(
    candidates: &[&Analysis],
    locked_edges: &[(String, String)],
) -> Result<Vec<Chain>, InfeasiblePlan> {
    let index_by_hash: HashMap<&str, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, a)| (a.content_hash.as_str(), i))
        .collect();

    let mut next: HashMap<usize, usize> = HashMap::new();
    let mut prev: HashMap<usize, usize> = HashMap::new();

    for (from, to) in locked_edges {
        let Some(&from_idx) = index_by_hash.get(from.as_str()) else {
            return Err(InfeasiblePlan::new(
                "locked_edge_invalid",
                format!("locked edge references track {from}, not present in the candidate set"),
            ));
        };
        let Some(&to_idx) = index_by_hash.get(to.as_str()) else {
            return Err(InfeasiblePlan::new(
                "locked_edge_invalid",
                format!("locked edge references track {to}, not present in the candidate set"),
            ));
        };
        if next.contains_key(&from_idx) || prev.contains_key(&to_idx) {
            return Err(InfeasiblePlan::new(
                "locked_edge_invalid",
                format!("locked edges branch at track {from} or {to}"),
            ));
        }
        next.insert(from_idx, to_idx);
        prev.insert(to_idx, from_idx);
    }

    let mut assigned = vec![false; candidates.len()];
    let mut chains = Vec::new();

    for start in 0..candidates.len() {
        if assigned[start] || prev.contains_key(&start) {
            continue;
        }
        let mut chain = vec![start];
        assigned[start] = true;
        let mut cur = start;
        while let Some(&nxt) = next.get(&cur) {
            if assigned[nxt] {
                return Err(InfeasiblePlan::new("locked_edge_invalid", "locked edges form a cycle"));
            }
            chain.push(nxt);
            assigned[nxt] = true;
            cur = nxt;
        }
        chains.push(chain);
    }

    if assigned.iter().any(|&a| !a) {
        return Err(InfeasiblePlan::new("locked_edge_invalid", "locked edges form a cycle"));
    }

    Ok(chains)
}

/// Finds the chain containing `hash`, requiring it sit at the chain's head
/// (`must_be_head = true`, for `start_track`) or tail (for `end_track`) —
/// a locked chain can't be reordered internally to satisfy a start/end
/// constraint on one of its interior tracks.
fn chain_index_of(
    candidates: &[&Analysis],
    chains: &[Chain],
    hash: Option<&str>,
    must_be_head: bool,
) -> Result<Option<usize>, InfeasiblePlan> {
    let Some(hash) = hash else {
        return Ok(None);
    };
    for (chain_idx, chain) in chains.iter().enumerate() {
        if let Some(pos) = chain.iter().position(|&i| candidates[i].content_hash == hash) {
            let at_boundary = if must_be_head { pos == 0 } else { pos == chain.len() - 1 };
            if !at_boundary {
                let edge = if must_be_head { "start" } else { "end" };
                return Err(InfeasiblePlan::new(
                    "locked_edge_invalid",
                    format!("track {hash} is locked inside a chain and can't also be the {edge} track"),
                ));
            }
            return Ok(Some(chain_idx));
        }
    }
    Ok(None)
}

/// Exact Hamiltonian-path maximization by subset DP.
/// `dp[mask][j]` is the best total score of a path visiting exactly the
/// node set `mask` and ending at `j`.
fn held_karp(
    n: usize,
    start_idx: Option<usize>,
    end_idx: Option<usize>,
    weight: &dyn Fn(usize, usize) -> f64,
) -> Option<Vec<usize>> {
    let full_mask = (1usize << n) - 1;
    let mut dp = vec![vec![f64::NEG_INFINITY; n]; 1 << n];
    let mut parent = vec![vec![usize::MAX; n]; 1 << n];

    for j in 0..n {
        if start_idx.is_none() || start_idx == Some(j) {
            dp[1 << j][j] = 0.0;
        }
    }

    for mask in 1..=full_mask {
        for j in 0..n {
            if mask & (1 << j) == 0 || dp[mask][j] == f64::NEG_INFINITY {
                continue;
            }
            for k in 0..n {
                if mask & (1 << k) != 0 {
                    continue;
                }
                let w = weight(j, k);
                if !w.is_finite() {
                    continue;
                }
                let next_mask = mask | (1 << k);
                let candidate = dp[mask][j] + w;
                if candidate > dp[next_mask][k] {
                    dp[next_mask][k] = candidate;
                    parent[next_mask][k] = j;
                }
            }
        }
    }

    let end_candidates: Vec<usize> = match end_idx {
        Some(j) => vec![j],
        None => (0..n).collect(),
    };

    let best_end = end_candidates
        .into_iter()
        .filter(|&j| dp[full_mask][j] != f64::NEG_INFINITY)
        .max_by(|&a, &b| dp[full_mask][a].partial_cmp(&dp[full_mask][b]).unwrap())?;

    let mut order = Vec::with_capacity(n);
    let mut mask = full_mask;
    let mut node = best_end;
    loop {
        order.push(node);
        let prev = parent[mask][node];
        if prev == usize::MAX {
            break;
        }
        mask &= !(1 << node);
        node = prev;
    }
    order.reverse();
    Some(order)
}

/// Above [`EXACT_SOLVE_LIMIT`], seed `GREEDY_SEED_COUNT` greedy
/// completions from distinct starting points and refine each with 2-opt,
/// keeping the best. The seed RNG makes the choice of
/// starting points reproducible.
fn greedy_then_two_opt(
    n: usize,
    start_idx: Option<usize>,
    end_idx: Option<usize>,
    weight: &dyn Fn(usize, usize) -> f64,
    seed: u64,
) -> Option<Vec<usize>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut starts: Vec<usize> = match start_idx {
        Some(s) => vec![s],
        None => {
            let mut all: Vec<usize> = (0..n).collect();
            all.shuffle(&mut rng);
            all.into_iter().take(GREEDY_SEED_COUNT).collect()
        }
    };
    starts.dedup();

    let mut best: Option<(Vec<usize>, f64)> = None;
    for start in starts {
        let Some(order) = greedy_complete(n, start, end_idx, weight) else {
            continue;
        };
        let order = two_opt(order, weight);
        let score = path_score(&order, weight);
        if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
            best = Some((order, score));
        }
    }
    best.map(|(order, _)| order)
}

fn greedy_complete(
    n: usize,
    start: usize,
    end_idx: Option<usize>,
    weight: &dyn Fn(usize, usize) -> f64,
) -> Option<Vec<usize>> {
    let mut visited = vec![false; n];
    visited[start] = true;
    let mut order = vec![start];

    while order.len() < n {
        let current = *order.last().unwrap();
        let remaining = order.len() == n - 1;
        let next = (0..n)
            .filter(|&k| !visited[k])
            .filter(|&k| !remaining || end_idx.is_none() || Some(k) == end_idx)
            .max_by(|&a, &b| weight(current, a).partial_cmp(&weight(current, b)).unwrap())?;
        if !weight(current, next).is_finite() {
            return None;
        }
        visited[next] = true;
        order.push(next);
    }

    if let Some(end) = end_idx {
        if *order.last().unwrap() != end {
            return None;
        }
    }
    Some(order)
}

fn path_score(order: &[usize], weight: &dyn Fn(usize, usize) -> f64) -> f64 {
    order.windows(2).map(|pair| weight(pair[0], pair[1])).sum()
}

fn two_opt(mut order: Vec<usize>, weight: &dyn Fn(usize, usize) -> f64) -> Vec<usize> {
    let n = order.len();
    let mut improved = true;
    while improved {
        improved = false;
        for i in 0..n.saturating_sub(1) {
            for j in (i + 1)..n {
                let mut candidate = order.clone();
                candidate[i..=j].reverse();
                if path_score(&candidate, weight) > path_score(&order, weight) {
                    order = candidate;
                    improved = true;
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnalysisStatus;

    fn track(hash: &str, bpm: f64) -> Analysis {
        Analysis {
            content_hash: hash.into(),
            version: 1,
            status: AnalysisStatus::Complete,
            duration: 200.0,
            bpm: Some(bpm),
            bpm_confidence: None,
            key: Some("8A".into()),
            key_confidence: None,
            energy: Some(5),
            integrated_loudness: None,
            true_peak: None,
            loudness_range: None,
            beatgrid: vec![],
            sections: vec![],
            cue_points: vec![],
            embedding: None,
            openl3_embedding: None,
        }
    }

    #[test]
    fn held_karp_visits_every_candidate_exactly_once() {
        let tracks = vec![track("A", 120.0), track("B", 121.0), track("C", 140.0)];
        let refs: Vec<&Analysis> = tracks.iter().collect();
        let weights = EdgeWeights::for_mode(SetMode::OpenFormat);
        let constraints = PlanConstraints::with_defaults();
        let order = solve(&refs, &constraints, SetMode::OpenFormat, &weights, 0).unwrap();
        assert_eq!(order.len(), 3);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["A", "B", "C"]);
    }

    #[test]
    fn held_karp_honors_a_fixed_start_track() {
        let tracks = vec![track("A", 120.0), track("B", 121.0), track("C", 122.0)];
        let refs: Vec<&Analysis> = tracks.iter().collect();
        let weights = EdgeWeights::for_mode(SetMode::OpenFormat);
        let mut constraints = PlanConstraints::with_defaults();
        constraints.start_track = Some("B".into());
        let order = solve(&refs, &constraints, SetMode::OpenFormat, &weights, 0).unwrap();
        assert_eq!(order[0], "B");
    }

    #[test]
    fn locked_edge_pins_two_tracks_adjacent_against_the_natural_ordering() {
        let tracks = vec![
            track("A", 120.0),
            track("B", 121.0),
            track("C", 200.0),
            track("D", 201.0),
        ];
        let refs: Vec<&Analysis> = tracks.iter().collect();
        let weights = EdgeWeights::for_mode(SetMode::OpenFormat);
        let mut constraints = PlanConstraints::with_defaults();
        constraints.max_bpm_step = 1000.0;
        constraints.locked_edges = vec![("C".into(), "A".into())];

        let order = solve(&refs, &constraints, SetMode::OpenFormat, &weights, 0).unwrap();
        assert_eq!(order.len(), 4);
        let c_pos = order.iter().position(|h| h == "C").unwrap();
        assert_eq!(order[c_pos + 1], "A");
    }

    #[test]
    fn branching_locked_edges_are_infeasible() {
        let tracks = vec![track("A", 120.0), track("B", 121.0), track("C", 122.0)];
        let refs: Vec<&Analysis> = tracks.iter().collect();
        let weights = EdgeWeights::for_mode(SetMode::OpenFormat);
        let mut constraints = PlanConstraints::with_defaults();
        constraints.locked_edges = vec![("A".into(), "B".into()), ("A".into(), "C".into())];

        let err = solve(&refs, &constraints, SetMode::OpenFormat, &weights, 0).unwrap_err();
        assert_eq!(err.reason, "locked_edge_invalid");
    }

    #[test]
    fn cyclic_locked_edges_are_infeasible() {
        let tracks = vec![track("A", 120.0), track("B", 121.0)];
        let refs: Vec<&Analysis> = tracks.iter().collect();
        let weights = EdgeWeights::for_mode(SetMode::OpenFormat);
        let mut constraints = PlanConstraints::with_defaults();
        constraints.locked_edges = vec![("A".into(), "B".into()), ("B".into(), "A".into())];

        let err = solve(&refs, &constraints, SetMode::OpenFormat, &weights, 0).unwrap_err();
        assert_eq!(err.reason, "locked_edge_invalid");
    }

    #[test]
    fn start_track_locked_inside_a_chain_is_infeasible() {
        let tracks = vec![track("A", 120.0), track("B", 121.0), track("C", 122.0)];
        let refs: Vec<&Analysis> = tracks.iter().collect();
        let weights = EdgeWeights::for_mode(SetMode::OpenFormat);
        let mut constraints = PlanConstraints::with_defaults();
        constraints.locked_edges = vec![("A".into(), "B".into())];
        constraints.start_track = Some("B".into());

        let err = solve(&refs, &constraints, SetMode::OpenFormat, &weights, 0).unwrap_err();
        assert_eq!(err.reason, "locked_edge_invalid");
    }
}
