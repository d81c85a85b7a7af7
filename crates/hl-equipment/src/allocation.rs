//! Load-balancing policy.
//!
//! Run the fewest available units whose combined capacity covers the demand,
//! all at the same speed percentage. Among equally small sets prefer healthy
//! over degraded units, then the lowest cumulative runtime.

use std::cmp::Ordering;

use hl_alarms::Observation;
use hl_core::{CAPACITY_EPS, CommandSet, GroupId};

/// Exhaustive search is used up to this many available units.
const EXHAUSTIVE_LIMIT: usize = 16;

/// Outcome of one capacity request.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub group: GroupId,
    pub demand: f64,
    /// Capacity of the units that are not failed.
    pub available: f64,
    /// Capacity actually delivered by the running units.
    pub allocated: f64,
    /// Common speed of every running unit (%).
    pub speed_pct: f64,
    /// A command for every unit in the group.
    pub commands: CommandSet,
    pub observations: Vec<Observation>,
}

impl Allocation {
    pub fn shortfall(&self) -> f64 {
        (self.demand - self.allocated).max(0.0)
    }

    pub fn is_met(&self) -> bool {
        self.shortfall() <= CAPACITY_EPS
    }

    pub fn running(&self) -> usize {
        self.commands.iter().filter(|(_, c)| c.enabled).count()
    }
}

/// A unit eligible to run, in preference order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub capacity: f64,
    pub degraded: bool,
    /// Runtime minus the rotation hysteresis for units already running.
    pub effective_runtime_h: f64,
}

pub(crate) fn preference(a: &Candidate, b: &Candidate) -> Ordering {
    a.degraded
        .cmp(&b.degraded)
        .then(a.effective_runtime_h.total_cmp(&b.effective_runtime_h))
}

/// Indices into `candidates` that should run to cover `demand`.
///
/// `candidates` must already be sorted with [`preference`].
pub(crate) fn select(candidates: &[Candidate], demand: f64) -> Vec<usize> {
    if demand <= CAPACITY_EPS || candidates.is_empty() {
        return Vec::new();
    }
    let total: f64 = candidates.iter().map(|c| c.capacity).sum();
    if total < demand - CAPACITY_EPS {
        return (0..candidates.len()).collect();
    }

    let mut by_capacity: Vec<f64> = candidates.iter().map(|c| c.capacity).collect();
    by_capacity.sort_by(|a, b| b.total_cmp(a));
    let mut acc = 0.0;
    let min_count = by_capacity
        .iter()
        .position(|cap| {
            acc += cap;
            acc >= demand - CAPACITY_EPS
        })
        .map_or(candidates.len(), |i| i + 1);

    if candidates.len() <= EXHAUSTIVE_LIMIT {
        exhaustive(candidates, demand, min_count)
    } else {
        greedy(candidates, demand)
    }
}

fn exhaustive(candidates: &[Candidate], demand: f64, count: usize) -> Vec<usize> {
    let n = candidates.len();
    let mut best: Option<(usize, f64, Vec<usize>)> = None;
    for mask in 0u32..(1u32 << n) {
        if mask.count_ones() as usize != count {
            continue;
        }
        let picked: Vec<usize> = (0..n).filter(|i| mask & (1 << i) != 0).collect();
        let capacity: f64 = picked.iter().map(|&i| candidates[i].capacity).sum();
        if capacity < demand - CAPACITY_EPS {
            continue;
        }
        let degraded = picked.iter().filter(|&&i| candidates[i].degraded).count();
        let runtime: f64 = picked.iter().map(|&i| candidates[i].effective_runtime_h).sum();
        let better = match &best {
            None => true,
            Some((d, r, p)) => (degraded, runtime, &picked)
                .partial_cmp(&(*d, *r, p))
                .is_some_and(|o| o == Ordering::Less),
        };
        if better {
            best = Some((degraded, runtime, picked));
        }
    }
    best.map(|(_, _, picked)| picked).unwrap_or_default()
}

fn greedy(candidates: &[Candidate], demand: f64) -> Vec<usize> {
    let mut acc = 0.0;
    let mut picked = Vec::new();
    for (i, c) in candidates.iter().enumerate() {
        if acc >= demand - CAPACITY_EPS {
            break;
        }
        acc += c.capacity;
        picked.push(i);
    }
    picked
}
