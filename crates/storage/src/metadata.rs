// SPDX-License-Identifier: MIT

//! The metadata document (`data_product.yaml`): the single place the
//! processing worker records what it has finished, since the spec leaves
//! the exact schema as an open question (spec §9). The schema fixed here:
//!
//! ```yaml
//! eb_id: eb-01
//! subsystem_id: pst-low
//! scan_id: scan-0007
//! processing:
//!   expected_pairs: 3
//!   processed_pairs: 2
//!   completed: false
//!   pair_summaries:
//!     - key: "0001"
//!       stat_path: stat/0001.h5
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sdp_core::{ScanId, TransferError};

pub const METADATA_FILE_NAME: &str = "data_product.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairSummary {
    pub key: String,
    pub stat_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Processing {
    pub expected_pairs: usize,
    pub processed_pairs: usize,
    pub completed: bool,
    #[serde(default)]
    pub pair_summaries: Vec<PairSummary>,
}

impl Processing {
    fn new(expected_pairs: usize) -> Self {
        Self {
            expected_pairs,
            processed_pairs: 0,
            completed: false,
            pair_summaries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataProduct {
    pub eb_id: String,
    pub subsystem_id: String,
    pub scan_id: String,
    pub processing: Processing,
}

impl DataProduct {
    pub fn new(scan: &ScanId, expected_pairs: usize) -> Self {
        Self {
            eb_id: scan.eb_id.clone(),
            subsystem_id: scan.subsystem_id.clone(),
            scan_id: scan.scan_id.clone(),
            processing: Processing::new(expected_pairs),
        }
    }

    pub fn path(scan_root: &Path) -> PathBuf {
        scan_root.join(METADATA_FILE_NAME)
    }

    /// Loads the document from `scan_root/data_product.yaml` if present.
    pub fn load(scan: &ScanId, scan_root: &Path) -> Result<Option<Self>, TransferError> {
        let path = Self::path(scan_root);
        match fs::read(&path) {
            Ok(bytes) => {
                let doc = serde_yaml::from_slice(&bytes).map_err(|err| {
                    TransferError::InvariantViolation {
                        scan: scan.clone(),
                        detail: format!("malformed {}: {err}", METADATA_FILE_NAME),
                    }
                })?;
                Ok(Some(doc))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(TransferError::Io {
                scan: scan.clone(),
                path,
                source,
            }),
        }
    }

    /// Records that `key`'s stat file was generated, bumping the processed
    /// count and appending its summary. Idempotent: re-recording the same
    /// key is a no-op so a crash-and-retry never double counts.
    pub fn record_pair_processed(&mut self, key: &str, stat_path: &str) {
        if self.processing.pair_summaries.iter().any(|p| p.key == key) {
            return;
        }
        self.processing.pair_summaries.push(PairSummary {
            key: key.to_string(),
            stat_path: stat_path.to_string(),
        });
        self.processing.processed_pairs = self.processing.pair_summaries.len();
    }

    pub fn finalize_processing(&mut self) {
        self.processing.completed = true;
    }

    pub fn is_processing_completed(&self) -> bool {
        self.processing.completed
            && self.processing.processed_pairs >= self.processing.expected_pairs
    }

    /// Writes the document to `scan_root/data_product.yaml` by first
    /// writing a sibling temp file, then renaming it into place, so no
    /// reader ever observes a half-written document (spec §3/§5/§9).
    pub fn write_atomic(&self, scan: &ScanId, scan_root: &Path) -> Result<(), TransferError> {
        let final_path = Self::path(scan_root);
        let tmp_path = scan_root.join(format!("{METADATA_FILE_NAME}.tmp"));

        let body = serde_yaml::to_string(self).map_err(|err| TransferError::InvariantViolation {
            scan: scan.clone(),
            detail: format!("failed to serialize {}: {err}", METADATA_FILE_NAME),
        })?;

        fs::write(&tmp_path, body).map_err(|source| TransferError::Io {
            scan: scan.clone(),
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &final_path).map_err(|source| TransferError::Io {
            scan: scan.clone(),
            path: final_path.clone(),
            source,
        })?;
        tracing::debug!(%scan, path = %final_path.display(), "wrote data_product.yaml");
        Ok(())
    }
}
