// SPDX-License-Identifier: MIT

//! Tracks whether a file has "stopped growing" across polling cycles
//! (spec §4.E): a pair is processable once both members have held a
//! constant size for `quiescence_cycles` consecutive polls. Shared between
//! `ScanManager`'s discovery poll and both workers so the observation is
//! made once per cycle, not duplicated per worker.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observation {
    size: u64,
    /// The poll cycle at which this size was first observed.
    stable_since: u64,
}

pub struct QuiescenceTracker {
    quiescence_cycles: u32,
    cycle: Mutex<u64>,
    observed: Mutex<HashMap<PathBuf, Observation>>,
}

impl QuiescenceTracker {
    pub fn new(quiescence_cycles: u32) -> Self {
        Self {
            quiescence_cycles,
            cycle: Mutex::new(0),
            observed: Mutex::new(HashMap::new()),
        }
    }

    /// Advances the shared poll counter. Called once per `ScanManager`
    /// discovery poll, before workers consult `is_stable`.
    pub fn tick(&self) -> u64 {
        let mut cycle = self.cycle.lock();
        *cycle += 1;
        *cycle
    }

    /// Records `path`'s current size and reports whether it has been
    /// unchanged for at least `quiescence_cycles` polls, this one included.
    pub fn observe(&self, path: &std::path::Path, size: u64) -> bool {
        let cycle = *self.cycle.lock();
        let mut observed = self.observed.lock();
        let entry = observed
            .entry(path.to_path_buf())
            .and_modify(|obs| {
                if obs.size != size {
                    obs.size = size;
                    obs.stable_since = cycle;
                }
            })
            .or_insert(Observation {
                size,
                stable_since: cycle,
            });
        cycle.saturating_sub(entry.stable_since) + 1 >= u64::from(self.quiescence_cycles)
    }

    /// Drops tracking state for a path once its scan is done with it, so a
    /// long-lived daemon doesn't accumulate entries for deleted scans.
    pub fn forget_prefix(&self, prefix: &std::path::Path) {
        self.observed.lock().retain(|path, _| !path.starts_with(prefix));
    }
}
