// SPDX-License-Identifier: MIT

//! `VoltageRecorderScan`: a polymorphic view over one scan directory, local
//! or remote (spec §4.B/C). The same type walks either root; only the root
//! path differs, so diffing local against remote is just comparing two
//! instances of this type.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use sdp_core::{ArtifactKind, ScanId, TransferError};

use crate::file::VoltageRecorderFile;
use crate::metadata::DataProduct;

pub const DATA_DIR: &str = "data";
pub const WEIGHTS_DIR: &str = "weights";
pub const STAT_DIR: &str = "stat";
pub const SCAN_CONFIGURATION_FILE: &str = "scan_configuration.json";
pub const OBS_HEADER_FILE: &str = "obs.header";
pub const SCAN_COMPLETED_SENTINEL: &str = "scan_completed";
pub const TRANSFER_COMPLETED_SENTINEL: &str = "transfer_completed";

/// One `data/weights` pair, keyed by the shared filename suffix. Either
/// member may be absent momentarily while a scan is still recording; `stat`
/// is absent until post-processing runs.
#[derive(Debug, Clone)]
pub struct Pair {
    pub key: String,
    pub data: Option<VoltageRecorderFile>,
    pub weights: Option<VoltageRecorderFile>,
    pub stat: Option<VoltageRecorderFile>,
}

impl Pair {
    /// Both `data` and `weights` exist. Does not imply quiescence; the
    /// caller (ScanProcess) layers the "stopped growing" check on top.
    pub fn has_both_members(&self) -> bool {
        self.data.is_some() && self.weights.is_some()
    }

    pub fn has_stat(&self) -> bool {
        self.stat.is_some()
    }
}

/// Behavior common to any scan view, local or remote. Defined as a trait
/// so engine code can be written against "a scan" without caring which
/// side it is looking at.
pub trait Scan {
    fn scan_id(&self) -> &ScanId;
    fn root(&self) -> &Path;

    /// Pairs keyed by suffix, in lexicographic key order, finite and not
    /// restartable: call again for a fresh view.
    fn enumerate_pairs(&self) -> Result<Vec<Pair>, TransferError>;

    fn unprocessed_pairs(&self) -> Result<Vec<Pair>, TransferError> {
        Ok(self
            .enumerate_pairs()?
            .into_iter()
            .filter(|p| !p.has_stat())
            .collect())
    }

    fn is_scan_completed(&self) -> bool {
        self.root().join(SCAN_COMPLETED_SENTINEL).exists()
    }

    fn is_transfer_completed(&self) -> bool {
        self.root().join(TRANSFER_COMPLETED_SENTINEL).exists()
    }

    /// Every pair has a stat file AND the metadata document's processing
    /// section reports completion against the expected pair count.
    fn is_processing_completed(&self) -> Result<bool, TransferError> {
        let pairs = self.enumerate_pairs()?;
        if pairs.iter().any(|p| !p.has_stat()) {
            return Ok(false);
        }
        match DataProduct::load(self.scan_id(), self.root())? {
            Some(doc) => Ok(doc.is_processing_completed()),
            None => Ok(false),
        }
    }

    /// `scan_completed ∧ is_processing_completed ∧ is_transfer_completed`,
    /// evaluated against this (local) view.
    fn is_complete(&self) -> Result<bool, TransferError> {
        Ok(self.is_scan_completed() && self.is_processing_completed()? && self.is_transfer_completed())
    }

    /// Removes the scan directory entirely. Refuses unless `is_complete()`
    /// holds (spec §4.B); a directory that is already gone is treated as
    /// already deleted rather than re-checked for completeness.
    fn delete(&self) -> Result<(), TransferError> {
        if self.root().exists() && !self.is_complete()? {
            return Err(TransferError::InvariantViolation {
                scan: self.scan_id().clone(),
                detail: "delete() called on a scan that is not complete".to_string(),
            });
        }
        match fs::remove_dir_all(self.root()) {
            Ok(()) => {
                tracing::debug!(scan = %self.scan_id(), root = %self.root().display(), "deleted completed scan");
                Ok(())
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TransferError::Io {
                scan: self.scan_id().clone(),
                path: self.root().to_path_buf(),
                source,
            }),
        }
    }
}

/// The concrete `Scan` over a real directory tree, used for both the local
/// and the remote root (spec calls this out as a "polymorphic view").
#[derive(Debug, Clone)]
pub struct VoltageRecorderScan {
    scan_id: ScanId,
    root: PathBuf,
}

impl VoltageRecorderScan {
    pub fn new(scan_id: ScanId, root: PathBuf) -> Self {
        Self { scan_id, root }
    }

    fn dir_keys(&self, dir_name: &str, suffix: &str) -> Result<BTreeSet<String>, TransferError> {
        let dir = self.root.join(dir_name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeSet::new())
            }
            Err(source) => {
                return Err(TransferError::Io {
                    scan: self.scan_id.clone(),
                    path: dir,
                    source,
                })
            }
        };

        let mut keys = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| TransferError::Io {
                scan: self.scan_id.clone(),
                path: dir.clone(),
                source,
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(key) = name.strip_suffix(suffix) {
                keys.insert(key.to_string());
            }
        }
        Ok(keys)
    }

    fn stat_file(&self, relative: &Path, kind: ArtifactKind) -> Result<Option<VoltageRecorderFile>, TransferError> {
        let path = self.root.join(relative);
        match VoltageRecorderFile::stat(&self.scan_id, &path, kind) {
            Ok(file) => Ok(Some(file)),
            Err(TransferError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn top_level_files(&self) -> Result<Vec<(PathBuf, ArtifactKind)>, TransferError> {
        let mut files = Vec::new();
        for (name, kind) in [
            (SCAN_CONFIGURATION_FILE, ArtifactKind::Config),
            (OBS_HEADER_FILE, ArtifactKind::Config),
        ] {
            if self.root.join(name).exists() {
                files.push((PathBuf::from(name), kind));
            }
        }
        Ok(files)
    }

    /// Every artifact whose remote counterpart is missing, size-differs, or
    /// checksum-differs, in the order spec §4.C fixes: data/weights pairs
    /// first, then stat files, then config/header, then the metadata
    /// document, then `scan_completed`. `transfer_completed` never appears.
    pub fn untransferred_files(
        &self,
        remote: &VoltageRecorderScan,
    ) -> Result<Vec<VoltageRecorderFile>, TransferError> {
        let mut out = Vec::new();

        for pair in self.enumerate_pairs()? {
            for member in [pair.data, pair.weights] {
                if let Some(mut local) = member {
                    self.push_if_untransferred(&mut local, remote, &mut out)?;
                }
            }
        }
        for pair in self.enumerate_pairs()? {
            if let Some(mut stat) = pair.stat {
                self.push_if_untransferred(&mut stat, remote, &mut out)?;
            }
        }
        for (relative, kind) in self.top_level_files()? {
            if let Some(mut local) = self.stat_file(&relative, kind)? {
                self.push_if_untransferred(&mut local, remote, &mut out)?;
            }
        }
        if let Some(mut meta) = self.stat_file(
            Path::new(crate::metadata::METADATA_FILE_NAME),
            ArtifactKind::Metadata,
        )? {
            self.push_if_untransferred(&mut meta, remote, &mut out)?;
        }
        if self.is_scan_completed() {
            if let Some(mut sentinel) = self.stat_file(
                Path::new(SCAN_COMPLETED_SENTINEL),
                ArtifactKind::Sentinel,
            )? {
                self.push_if_untransferred(&mut sentinel, remote, &mut out)?;
            }
        }

        Ok(out)
    }

    fn push_if_untransferred(
        &self,
        local: &mut VoltageRecorderFile,
        remote: &VoltageRecorderScan,
        out: &mut Vec<VoltageRecorderFile>,
    ) -> Result<(), TransferError> {
        let relative = match local.path().strip_prefix(&self.root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => {
                return Err(TransferError::InvariantViolation {
                    scan: self.scan_id.clone(),
                    detail: format!(
                        "file {} is not under scan root {}",
                        local.path().display(),
                        self.root.display()
                    ),
                })
            }
        };
        let remote_path = remote.root.join(&relative);

        let needs_transfer = match VoltageRecorderFile::stat(&self.scan_id, &remote_path, local.kind()) {
            Ok(mut remote_file) => !local.equals(&mut remote_file, &self.scan_id)?,
            Err(TransferError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                true
            }
            Err(err) => return Err(err),
        };

        if needs_transfer {
            out.push(local.clone());
        }
        Ok(())
    }
}

impl Scan for VoltageRecorderScan {
    fn scan_id(&self) -> &ScanId {
        &self.scan_id
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn enumerate_pairs(&self) -> Result<Vec<Pair>, TransferError> {
        let data_keys = self.dir_keys(DATA_DIR, ".dada")?;
        let weights_keys = self.dir_keys(WEIGHTS_DIR, ".dada")?;
        let stat_keys = self.dir_keys(STAT_DIR, ".h5")?;

        let mut keys: BTreeSet<String> = BTreeSet::new();
        keys.extend(data_keys.iter().cloned());
        keys.extend(weights_keys.iter().cloned());
        keys.extend(stat_keys.iter().cloned());

        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            let data = if data_keys.contains(&key) {
                self.stat_file(
                    Path::new(DATA_DIR).join(format!("{key}.dada")).as_path(),
                    ArtifactKind::Data,
                )?
            } else {
                None
            };
            let weights = if weights_keys.contains(&key) {
                self.stat_file(
                    Path::new(WEIGHTS_DIR).join(format!("{key}.dada")).as_path(),
                    ArtifactKind::Weights,
                )?
            } else {
                None
            };
            let stat = if stat_keys.contains(&key) {
                self.stat_file(
                    Path::new(STAT_DIR).join(format!("{key}.h5")).as_path(),
                    ArtifactKind::Stat,
                )?
            } else {
                None
            };
            pairs.push(Pair {
                key,
                data,
                weights,
                stat,
            });
        }
        Ok(pairs)
    }
}
