// SPDX-License-Identifier: MIT

//! `ScanProcess`: the post-processing worker (spec §4.E). Drains
//! processable pairs through the statistics binary, records progress in
//! the metadata document, and finalizes it once `scan_completed` appears
//! and every pair has a stat file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sdp_adapters::{StatBinaryAdapter, StatOutcome};
use sdp_core::{BackoffPolicy, ScanId, TransferError};
use sdp_storage::scan::{Pair, STAT_DIR};
use sdp_storage::{DataProduct, Scan, VoltageRecorderScan};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ledger::ErrorLedger;
use crate::quiescence::QuiescenceTracker;

pub struct ScanProcess {
    local_root: PathBuf,
    stat_binary: Arc<dyn StatBinaryAdapter>,
    quiescence: Arc<QuiescenceTracker>,
    ledger: Arc<ErrorLedger>,
    cancel: CancellationToken,
}

impl ScanProcess {
    pub fn new(
        local_root: PathBuf,
        stat_binary: Arc<dyn StatBinaryAdapter>,
        quiescence: Arc<QuiescenceTracker>,
        ledger: Arc<ErrorLedger>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            local_root,
            stat_binary,
            quiescence,
            ledger,
            cancel,
        }
    }

    /// Runs until cancelled, waking on every tick the `ScanManager`
    /// publishes (a change in the assigned scan, or a repeat tick for the
    /// same scan so quiescence has another poll to settle on).
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
            if let Err(err) = self.process_tick(&scan_id).await {
                match err {
                    TransferError::Cancelled { .. } => break,
                    ref e if !e.is_retryable() => {
                        warn!(scan = %scan_id, error = %err, "processing worker marking scan errored");
                        self.ledger.mark_errored(&scan_id, err.to_string());
                    }
                    _ => {
                        warn!(scan = %scan_id, error = %err, "processing tick failed, will retry next poll");
                    }
                }
            }
        }
    }

    async fn process_tick(&self, scan_id: &ScanId) -> Result<(), TransferError> {
        let root = scan_id.resolve(&self.local_root);
        let scan = VoltageRecorderScan::new(scan_id.clone(), root.clone());

        let pairs = scan.enumerate_pairs()?;
        let total_pairs = pairs.len();

        for pair in &pairs {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled { scan: scan_id.clone() });
            }
            if pair.has_stat() || !pair.has_both_members() {
                continue;
            }
            if !self.pair_is_stable(pair) {
                continue;
            }
            self.generate_stat(scan_id, &root, pair, total_pairs).await?;
        }

        if scan.is_scan_completed() {
            let still_unprocessed = scan.unprocessed_pairs()?;
            if still_unprocessed.is_empty() {
                self.finalize_metadata(scan_id, &root, total_pairs)?;
            }
        }

        Ok(())
    }

    fn pair_is_stable(&self, pair: &Pair) -> bool {
        let data_stable = pair
            .data
            .as_ref()
            .map(|f| self.quiescence.observe(f.path(), f.size()))
            .unwrap_or(false);
        let weights_stable = pair
            .weights
            .as_ref()
            .map(|f| self.quiescence.observe(f.path(), f.size()))
            .unwrap_or(false);
        data_stable && weights_stable
    }

    async fn generate_stat(
        &self,
        scan_id: &ScanId,
        root: &Path,
        pair: &Pair,
        total_pairs: usize,
    ) -> Result<(), TransferError> {
        let Some(data) = &pair.data else { return Ok(()) };
        let Some(weights) = &pair.weights else { return Ok(()) };

        let stat_dir = root.join(STAT_DIR);
        std::fs::create_dir_all(&stat_dir).map_err(|source| TransferError::Io {
            scan: scan_id.clone(),
            path: stat_dir.clone(),
            source,
        })?;
        let stat_path = stat_dir.join(format!("{}.h5", pair.key));

        let policy = BackoffPolicy::STAT_RETRY;
        let mut attempt = 0u32;
        loop {
            let outcome = self
                .stat_binary
                .run(scan_id, data.path(), weights.path(), &stat_path, &self.cancel)
                .await?;

            match outcome {
                StatOutcome::Ok => {
                    info!(scan = %scan_id, pair = %pair.key, "stat generated");
                    self.record_progress(scan_id, root, &pair.key, total_pairs)?;
                    return Ok(());
                }
                StatOutcome::Retryable => {
                    attempt += 1;
                    if policy.exhausted(attempt) {
                        return Err(TransferError::SubprocessFailed {
                            scan: scan_id.clone(),
                            exit_code: None,
                            retryable: true,
                        });
                    }
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Err(TransferError::Cancelled { scan: scan_id.clone() })
                        }
                        _ = tokio::time::sleep(policy.delay_for(attempt - 1)) => {}
                    }
                }
                StatOutcome::Fatal => {
                    return Err(TransferError::SubprocessFailed {
                        scan: scan_id.clone(),
                        exit_code: None,
                        retryable: false,
                    })
                }
            }
        }
    }

    fn record_progress(
        &self,
        scan_id: &ScanId,
        root: &Path,
        key: &str,
        total_pairs: usize,
    ) -> Result<(), TransferError> {
        let mut doc = DataProduct::load(scan_id, root)?
            .unwrap_or_else(|| DataProduct::new(scan_id, total_pairs));
        if total_pairs > doc.processing.expected_pairs {
            doc.processing.expected_pairs = total_pairs;
        }
        doc.record_pair_processed(key, &format!("{STAT_DIR}/{key}.h5"));
        doc.write_atomic(scan_id, root)
    }

    fn finalize_metadata(&self, scan_id: &ScanId, root: &Path, total_pairs: usize) -> Result<(), TransferError> {
        let mut doc = DataProduct::load(scan_id, root)?
            .unwrap_or_else(|| DataProduct::new(scan_id, total_pairs));
        doc.finalize_processing();
        doc.write_atomic(scan_id, root)?;
        info!(scan = %scan_id, "processing finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdp_adapters::stat_binary::fake::FakeStatBinary;
    use std::fs;
    use std::time::Duration;

    fn scan_id() -> ScanId {
        ScanId::new("eb-01", "pst-low", "scan-01")
    }

    fn make_local_root() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = scan_id().resolve(dir.path());
        fs::create_dir_all(root.join("data")).unwrap();
        fs::create_dir_all(root.join("weights")).unwrap();
        (dir, root)
    }

    fn process_for(
        root_parent: &Path,
        stat: Arc<dyn StatBinaryAdapter>,
        quiescence: Arc<QuiescenceTracker>,
    ) -> ScanProcess {
        ScanProcess::new(
            root_parent.to_path_buf(),
            stat,
            quiescence,
            Arc::new(ErrorLedger::new()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn defers_pair_until_quiescent() {
        let (dir, root) = make_local_root();
        fs::write(root.join("data/0001.dada"), b"d").unwrap();
        fs::write(root.join("weights/0001.dada"), b"w").unwrap();

        let stat = Arc::new(FakeStatBinary::always(StatOutcome::Ok));
        // Mirrors ScanManager's poll loop, which ticks the shared tracker
        // once per discovery cycle before a worker ever observes a size.
        let quiescence = Arc::new(QuiescenceTracker::new(2));
        let worker = process_for(dir.path(), stat.clone(), quiescence.clone());

        quiescence.tick();
        worker.process_tick(&scan_id()).await.unwrap();
        assert_eq!(stat.call_count(), 0, "first poll should not yet be quiescent");

        quiescence.tick();
        worker.process_tick(&scan_id()).await.unwrap();
        assert_eq!(stat.call_count(), 1, "second poll observes the same size and runs stat");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_on_retryable_outcome_then_succeeds() {
        let (dir, root) = make_local_root();
        fs::write(root.join("data/0001.dada"), b"d").unwrap();
        fs::write(root.join("weights/0001.dada"), b"w").unwrap();

        let stat = Arc::new(FakeStatBinary::new([StatOutcome::Retryable, StatOutcome::Ok]));
        let worker = process_for(dir.path(), stat.clone(), Arc::new(QuiescenceTracker::new(1)));

        worker.process_tick(&scan_id()).await.unwrap();
        worker.process_tick(&scan_id()).await.unwrap();
        assert_eq!(stat.call_count(), 2);

        let doc = DataProduct::load(&scan_id(), &root).unwrap().unwrap();
        assert_eq!(doc.processing.processed_pairs, 1);
    }

    #[tokio::test]
    async fn fatal_outcome_marks_scan_errored_via_run_loop() {
        let (dir, root) = make_local_root();
        fs::write(root.join("data/0001.dada"), b"d").unwrap();
        fs::write(root.join("weights/0001.dada"), b"w").unwrap();

        let stat = Arc::new(FakeStatBinary::always(StatOutcome::Fatal));
        let ledger = Arc::new(ErrorLedger::new());
        let worker = ScanProcess::new(
            dir.path().to_path_buf(),
            stat,
            Arc::new(QuiescenceTracker::new(1)),
            ledger.clone(),
            CancellationToken::new(),
        );

        let (tx, rx) = watch::channel(Some(scan_id()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            let rx = rx.clone();
            async move {
                tokio::select! {
                    _ = worker.run(rx) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        });

        // Two ticks: first observes size, second is stable and runs stat to
        // exhaustion (fatal, no retry loop needed).
        tx.send(Some(scan_id())).ok();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(Some(scan_id())).ok();
        tokio::time::sleep(Duration::from_millis(20)).await;

        cancel.cancel();
        let _ = handle.await;

        assert!(ledger.is_errored(&scan_id()));
    }

    #[tokio::test]
    async fn finalizes_metadata_once_scan_completed_and_drained() {
        let (dir, root) = make_local_root();
        fs::write(root.join("scan_completed"), b"").unwrap();

        let stat = Arc::new(FakeStatBinary::always(StatOutcome::Ok));
        let worker = process_for(dir.path(), stat, Arc::new(QuiescenceTracker::new(1)));
        worker.process_tick(&scan_id()).await.unwrap();

        let doc = DataProduct::load(&scan_id(), &root).unwrap().unwrap();
        assert!(doc.processing.completed);
    }
}
