//! Directory store eviction policy.
//!
//! Pure decision functions consulted by the registry on every access mark,
//! pin and unpin. There is no background timer.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Inputs for one eviction sweep.
#[derive(Debug, Clone, Copy)]
pub struct EvictionInput<'a> {
    /// Every resident directory.
    pub stores: &'a [String],
    /// Last access mark per directory.
    pub last_access: &'a HashMap<String, Instant>,
    /// Directories that must not be evicted (pinned or loading).
    pub protected: &'a HashSet<String>,
    /// Resident capacity.
    pub max: usize,
    /// Idle time after which an unprotected store is evicted.
    pub ttl: Duration,
    pub now: Instant,
    /// The directory whose access triggered the sweep.
    pub skip: Option<&'a str>,
}

/// Whether a store may be disposed right now.
///
/// Disposal of a store that fails this check is a silent no-op.
pub fn can_dispose(exists: bool, pins: usize, loading: bool) -> bool {
    exists && pins == 0 && !loading
}

/// Picks the directories to evict.
///
/// 1. every unprotected store idle longer than `ttl`;
/// 2. then, while the resident count exceeds `max`, the oldest-accessed
///    unprotected stores.
///
/// `skip` is never a candidate.
pub fn pick_to_evict(input: EvictionInput<'_>) -> Vec<String> {
    let idle_for = |dir: &str| {
        input
            .last_access
            .get(dir)
            .map(|at| input.now.saturating_duration_since(*at))
            .unwrap_or(Duration::MAX)
    };
    let eligible = |dir: &str| !input.protected.contains(dir) && input.skip != Some(dir);

    let mut evict: Vec<String> = input
        .stores
        .iter()
        .filter(|dir| eligible(dir.as_str()) && idle_for(dir.as_str()) > input.ttl)
        .cloned()
        .collect();

    let remaining = input.stores.len() - evict.len();
    if remaining <= input.max {
        return evict;
    }

    let mut candidates: Vec<&String> = input
        .stores
        .iter()
        .filter(|dir| eligible(dir.as_str()) && !evict.contains(*dir))
        .collect();
    // Oldest access first; directories never marked sort before all others.
    candidates.sort_by_key(|dir| std::cmp::Reverse(idle_for(dir.as_str())));

    evict.extend(
        candidates
            .into_iter()
            .take(remaining - input.max)
            .cloned(),
    );
    evict
}
