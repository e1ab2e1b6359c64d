// SPDX-License-Identifier: MIT

//! Records which scans have hit a fatal (non-retryable) error so the
//! supervisor can print a shutdown report (spec §8 scenario 6) and so
//! `ScanManager` knows to skip them rather than garbage-collecting or
//! re-announcing them forever.

use std::collections::HashMap;

use parking_lot::Mutex;
use sdp_core::ScanId;

#[derive(Default)]
pub struct ErrorLedger {
    errored: Mutex<HashMap<ScanId, String>>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_errored(&self, scan: &ScanId, reason: impl Into<String>) {
        self.errored.lock().insert(scan.clone(), reason.into());
    }

    pub fn is_errored(&self, scan: &ScanId) -> bool {
        self.errored.lock().contains_key(scan)
    }

    /// `(scan, reason)` pairs, sorted by scan for deterministic reporting.
    pub fn snapshot(&self) -> Vec<(ScanId, String)> {
        let mut entries: Vec<_> = self
            .errored
            .lock()
            .iter()
            .map(|(scan, reason)| (scan.clone(), reason.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
