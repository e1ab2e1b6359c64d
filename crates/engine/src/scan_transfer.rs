// SPDX-License-Identifier: MIT

//! `ScanTransfer`: the remote-replication worker (spec §4.F). Copies each
//! untransferred file into a `*.part` sibling, verifies its checksum
//! against the local original, then renames it into place. Writes
//! `transfer_completed` only once every file — including the metadata
//! document and `scan_completed` — has been replicated and
//! `is_processing_completed()` holds on the local side.
//!
//! Data/weights members defer to the same quiescence window as
//! `ScanProcess` (spec §4.F: "MAY copy any file that is stable... except
//! `transfer_completed`"; §8 scenario 2) — config, metadata, and sentinel
//! files are not growing payloads and move as soon as they differ from
//! the remote copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sdp_core::{ArtifactKind, BackoffPolicy, ScanId, TransferError};
use sdp_storage::scan::{SCAN_COMPLETED_SENTINEL, TRANSFER_COMPLETED_SENTINEL};
use sdp_storage::{Scan, VoltageRecorderFile, VoltageRecorderScan};
use tokio::fs as afs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ledger::ErrorLedger;
use crate::quiescence::QuiescenceTracker;

const CHUNK_BYTES: usize = 1024 * 1024;

pub struct ScanTransfer {
    local_root: PathBuf,
    remote_root: PathBuf,
    quiescence: Arc<QuiescenceTracker>,
    ledger: Arc<ErrorLedger>,
    cancel: CancellationToken,
}

impl ScanTransfer {
    pub fn new(
        local_root: PathBuf,
        remote_root: PathBuf,
        quiescence: Arc<QuiescenceTracker>,
        ledger: Arc<ErrorLedger>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            local_root,
            remote_root,
            quiescence,
            ledger,
            cancel,
        }
    }

    /// Data and weights members are still-growing payloads while a scan is
    /// recording; every other artifact kind (stat, config, metadata,
    /// sentinel) is written once and can move as soon as it differs from
    /// the remote copy (spec §4.F).
    fn is_stable(&self, file: &VoltageRecorderFile) -> bool {
        match file.kind() {
            ArtifactKind::Data | ArtifactKind::Weights => {
                self.quiescence.observe(file.path(), file.size())
            }
            ArtifactKind::Stat | ArtifactKind::Config | ArtifactKind::Metadata | ArtifactKind::Sentinel => true,
        }
    }

    pub async fn run(&self, mut rx: watch::Receiver<Option<ScanId>>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let current = rx.borrow_and_update().clone();
            let Some(scan_id) = current else { continue };
            if self.ledger.is_errored(&scan_id) {
                continue;
            }
            if let Err(err) = self.transfer_tick(&scan_id).await {
                match err {
                    TransferError::Cancelled { .. } => break,
                    ref e if !e.is_retryable() => {
                        warn!(scan = %scan_id, error = %err, "transfer worker marking scan errored");
                        self.ledger.mark_errored(&scan_id, err.to_string());
                    }
                    _ => {
                        warn!(scan = %scan_id, error = %err, "transfer tick failed, will retry next poll");
                    }
                }
            }
        }
    }

    async fn transfer_tick(&self, scan_id: &ScanId) -> Result<(), TransferError> {
        let local_root = scan_id.resolve(&self.local_root);
        let remote_root = scan_id.resolve(&self.remote_root);

        std::fs::create_dir_all(&remote_root).map_err(|source| TransferError::Io {
            scan: scan_id.clone(),
            path: remote_root.clone(),
            source,
        })?;

        let local_scan = VoltageRecorderScan::new(scan_id.clone(), local_root.clone());
        let remote_scan = VoltageRecorderScan::new(scan_id.clone(), remote_root.clone());

        let files = local_scan.untransferred_files(&remote_scan)?;
        let mut any_file_failed = false;

        for mut file in files {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled { scan: scan_id.clone() });
            }
            if !self.is_stable(&file) {
                debug!(scan = %scan_id, path = %file.path().display(), "skipping still-growing file this pass");
                continue;
            }
            let relative = file.path().strip_prefix(&local_root).map_err(|_| {
                TransferError::InvariantViolation {
                    scan: scan_id.clone(),
                    detail: format!("{} is not under local scan root", file.path().display()),
                }
            })?;
            let remote_final = remote_root.join(relative);
            if let Some(parent) = remote_final.parent() {
                std::fs::create_dir_all(parent).map_err(|source| TransferError::Io {
                    scan: scan_id.clone(),
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            if let Err(err) = self.copy_one_file(scan_id, &mut file, &remote_final).await {
                warn!(scan = %scan_id, path = %remote_final.display(), error = %err, "file transfer errored for this pass");
                any_file_failed = true;
            }
        }

        if any_file_failed {
            return Ok(());
        }

        let remaining = local_scan.untransferred_files(&remote_scan)?;
        if remaining.is_empty()
            && local_scan.is_scan_completed()
            && local_scan.is_processing_completed()?
        {
            self.write_transfer_completed(scan_id, &local_root, &remote_root)
                .await?;
        }

        Ok(())
    }

    async fn copy_one_file(
        &self,
        scan_id: &ScanId,
        local_file: &mut VoltageRecorderFile,
        remote_final: &Path,
    ) -> Result<(), TransferError> {
        let expected = local_file.checksum(scan_id)?;
        let policy = BackoffPolicy::FILE_RETRY;
        let file_name = remote_final
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = remote_final.with_file_name(format!("{file_name}.part"));

        let mut attempt = 0u32;
        loop {
            let copy_result = copy_with_checksum(scan_id, local_file.path(), &tmp_path, &self.cancel).await;
            match copy_result {
                Ok(actual) if actual == expected => {
                    afs::rename(&tmp_path, remote_final)
                        .await
                        .map_err(|source| TransferError::Io {
                            scan: scan_id.clone(),
                            path: remote_final.to_path_buf(),
                            source,
                        })?;
                    return Ok(());
                }
                Ok(_) => {
                    let _ = afs::remove_file(&tmp_path).await;
                    attempt += 1;
                    if policy.exhausted(attempt) {
                        return Err(TransferError::ChecksumMismatch {
                            scan: scan_id.clone(),
                            path: remote_final.to_path_buf(),
                        });
                    }
                }
                Err(err) => {
                    attempt += 1;
                    if policy.exhausted(attempt) || !err.is_retryable() {
                        return Err(err);
                    }
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled { scan: scan_id.clone() }),
                _ = tokio::time::sleep(policy.delay_for(attempt - 1)) => {}
            }
        }
    }

    async fn write_transfer_completed(
        &self,
        scan_id: &ScanId,
        local_root: &Path,
        remote_root: &Path,
    ) -> Result<(), TransferError> {
        write_sentinel_atomic(scan_id, &local_root.join(TRANSFER_COMPLETED_SENTINEL)).await?;
        write_sentinel_atomic(scan_id, &remote_root.join(TRANSFER_COMPLETED_SENTINEL)).await?;
        info!(scan = %scan_id, "transfer completed");
        Ok(())
    }
}

async fn write_sentinel_atomic(scan_id: &ScanId, path: &Path) -> Result<(), TransferError> {
    let tmp = path.with_file_name(format!(
        "{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    afs::write(&tmp, b"").await.map_err(|source| TransferError::Io {
        scan: scan_id.clone(),
        path: tmp.clone(),
        source,
    })?;
    afs::rename(&tmp, path).await.map_err(|source| TransferError::Io {
        scan: scan_id.clone(),
        path: path.to_path_buf(),
        source,
    })
}

/// Copies `local` into `tmp_path` in fixed-size chunks, yielding between
/// each one so cancellation is honored mid-file (spec §5), and folds the
/// bytes read into a CRC32 so the remote copy's checksum is known without
/// a second read pass.
async fn copy_with_checksum(
    scan_id: &ScanId,
    local: &Path,
    tmp_path: &Path,
    cancel: &CancellationToken,
) -> Result<u32, TransferError> {
    let mut src = afs::File::open(local).await.map_err(|source| TransferError::Io {
        scan: scan_id.clone(),
        path: local.to_path_buf(),
        source,
    })?;
    let mut dst = afs::File::create(tmp_path)
        .await
        .map_err(|source| TransferError::Io {
            scan: scan_id.clone(),
            path: tmp_path.to_path_buf(),
            source,
        })?;

    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; CHUNK_BYTES];

    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled { scan: scan_id.clone() });
        }
        let read = src.read(&mut buf).await.map_err(|source| TransferError::Io {
            scan: scan_id.clone(),
            path: local.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        dst.write_all(&buf[..read])
            .await
            .map_err(|source| TransferError::Io {
                scan: scan_id.clone(),
                path: tmp_path.to_path_buf(),
                source,
            })?;
        hasher.update(&buf[..read]);
        tokio::task::yield_now().await;
    }

    dst.flush().await.map_err(|source| TransferError::Io {
        scan: scan_id.clone(),
        path: tmp_path.to_path_buf(),
        source,
    })?;
    dst.sync_all().await.map_err(|source| TransferError::Io {
        scan: scan_id.clone(),
        path: tmp_path.to_path_buf(),
        source,
    })?;

    Ok(hasher.finalize())
}
