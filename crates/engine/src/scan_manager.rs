// SPDX-License-Identifier: MIT

//! `ScanManager`: the discovery loop (spec §4.D). Polls the local root,
//! orders scans chronologically, hands each worker the single scan it
//! should currently be working on via a watch channel (a slot, not a
//! queue — the latest value always wins), and garbage-collects scans once
//! they are complete and registered with the Dashboard.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sdp_adapters::DashboardAdapter;
use sdp_core::{BackoffPolicy, ScanId, TransferError};
use sdp_storage::{DataProduct, Scan, VoltageRecorderScan};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::discover_scans;
use crate::ledger::ErrorLedger;
use crate::quiescence::QuiescenceTracker;

pub struct ScanManager {
    local_root: PathBuf,
    remote_root: PathBuf,
    subsystem: String,
    poll_interval: Duration,
    dashboard: Arc<dyn DashboardAdapter>,
    ledger: Arc<ErrorLedger>,
    quiescence: Arc<QuiescenceTracker>,
    cancel: CancellationToken,
    process_tx: watch::Sender<Option<ScanId>>,
    transfer_tx: watch::Sender<Option<ScanId>>,
    /// Scans already registered with the Dashboard this run, so a scan
    /// whose registration succeeded but whose deletion failed (or hasn't
    /// run yet) is never registered twice on a later poll (spec §8.4).
    registered: Mutex<HashSet<ScanId>>,
}

impl ScanManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_root: PathBuf,
        remote_root: PathBuf,
        subsystem: String,
        poll_interval: Duration,
        dashboard: Arc<dyn DashboardAdapter>,
        ledger: Arc<ErrorLedger>,
        quiescence: Arc<QuiescenceTracker>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<Option<ScanId>>, watch::Receiver<Option<ScanId>>) {
        let (process_tx, process_rx) = watch::channel(None);
        let (transfer_tx, transfer_rx) = watch::channel(None);
        (
            Self {
                local_root,
                remote_root,
                subsystem,
                poll_interval,
                dashboard,
                ledger,
                quiescence,
                cancel,
                process_tx,
                transfer_tx,
                registered: Mutex::new(HashSet::new()),
            },
            process_rx,
            transfer_rx,
        )
    }

    fn local_scan(&self, scan_id: &ScanId) -> VoltageRecorderScan {
        VoltageRecorderScan::new(scan_id.clone(), scan_id.resolve(&self.local_root))
    }

    /// Runs until cancelled. Each iteration is one discovery poll.
    pub async fn run(&self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(err) = self.poll_once().await {
                warn!(error = %err, "scan discovery poll failed");
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn poll_once(&self) -> Result<(), TransferError> {
        self.quiescence.tick();

        let discovered = discover_scans(&self.local_root, &self.subsystem)?;
        debug!(count = discovered.len(), "discovery poll found scans");

        let mut next_process = None;
        let mut next_transfer = None;

        for d in &discovered {
            let scan_id = &d.scan_id;
            if self.ledger.is_errored(scan_id) {
                continue;
            }
            let local = self.local_scan(scan_id);

            if next_process.is_none() && !local.is_processing_completed()? {
                next_process = Some(scan_id.clone());
            }
            if next_transfer.is_none() && !local.is_transfer_completed() {
                next_transfer = Some(scan_id.clone());
            }
            if next_process.is_some() && next_transfer.is_some() {
                break;
            }
        }

        // Always send (even unchanged) so workers wake on each poll tick;
        // tokio::sync::watch notifies receivers regardless of equality.
        let _ = self.process_tx.send(next_process);
        let _ = self.transfer_tx.send(next_transfer);

        self.collect_completed(&discovered).await;
        Ok(())
    }

    async fn collect_completed(&self, discovered: &[crate::discovery::Discovered]) {
        for d in discovered {
            let scan_id = &d.scan_id;
            if self.ledger.is_errored(scan_id) {
                continue;
            }
            let local = self.local_scan(scan_id);
            let complete = match local.is_complete() {
                Ok(complete) => complete,
                Err(err) => {
                    warn!(scan = %scan_id, error = %err, "failed to evaluate scan completeness");
                    continue;
                }
            };
            if !complete {
                continue;
            }

            let already_registered = self.registered.lock().contains(scan_id);
            if !already_registered {
                let product = match DataProduct::load(scan_id, local.root()) {
                    Ok(Some(product)) => product,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(scan = %scan_id, error = %err, "failed to load metadata document for registration");
                        continue;
                    }
                };

                if let Err(err) = self.register_with_retry(scan_id, &product).await {
                    warn!(scan = %scan_id, error = %err, "dashboard registration failed after retries, scan stays on disk");
                    continue;
                }
                self.registered.lock().insert(scan_id.clone());
            }

            if let Err(err) = local.delete() {
                warn!(scan = %scan_id, error = %err, "failed to delete completed scan");
                continue;
            }
            self.registered.lock().remove(scan_id);
            self.quiescence.forget_prefix(local.root());
            info!(scan = %scan_id, "scan registered and removed");
        }
    }

    /// Registers `scan_id` with the Dashboard, retrying transient failures
    /// with the bounded backoff from spec §5 (3 attempts) before giving up
    /// for this poll; a still-unregistered scan is simply retried on the
    /// next discovery cycle.
    async fn register_with_retry(
        &self,
        scan_id: &ScanId,
        product: &DataProduct,
    ) -> Result<(), TransferError> {
        let policy = BackoffPolicy::DASHBOARD_RETRY;
        let mut attempt = 0u32;
        loop {
            match self.dashboard.register(scan_id, product).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if policy.exhausted(attempt) || !err.is_retryable() {
                        return Err(err);
                    }
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(TransferError::Cancelled { scan: scan_id.clone() }),
                        _ = tokio::time::sleep(policy.delay_for(attempt - 1)) => {}
                    }
                }
            }
        }
    }

    pub fn remote_root(&self) -> &std::path::Path {
        &self.remote_root
    }
}
