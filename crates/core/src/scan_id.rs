// SPDX-License-Identifier: MIT

//! Scan identity: the `(eb_id, subsystem_id, scan_id)` natural key (spec §3).

use std::fmt;
use std::path::{Path, PathBuf};

/// Identifies one scan, derived from its relative path `<eb_id>/<subsystem_id>/<scan_id>/`
/// beneath a root directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanId {
    pub eb_id: String,
    pub subsystem_id: String,
    pub scan_id: String,
}

impl ScanId {
    pub fn new(
        eb_id: impl Into<String>,
        subsystem_id: impl Into<String>,
        scan_id: impl Into<String>,
    ) -> Self {
        Self {
            eb_id: eb_id.into(),
            subsystem_id: subsystem_id.into(),
            scan_id: scan_id.into(),
        }
    }

    /// The relative path `<eb_id>/<subsystem_id>/<scan_id>` this identity maps to,
    /// appended to whichever root (local or remote) the caller holds.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.eb_id)
            .join(&self.subsystem_id)
            .join(&self.scan_id)
    }

    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(self.relative_path())
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.eb_id, self.subsystem_id, self.scan_id)
    }
}
