// SPDX-License-Identifier: MIT

//! `SdpTransfer`: the top-level supervisor (spec §4.G). Wires `ScanManager`
//! together with the `ScanProcess` and `ScanTransfer` workers, owns the
//! shared cancellation token, and reports errored scans on shutdown.

use std::sync::Arc;

use sdp_adapters::{DashboardAdapter, ExternalStatBinary, HttpDashboard, NoopDashboard};
use sdp_core::ScanId;
use sdp_engine::{ErrorLedger, QuiescenceTracker, ScanManager, ScanProcess, ScanTransfer};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;

/// Errored scans accumulated over a run, printed as a table on shutdown
/// (spec §7: "errored scans are listed on shutdown").
pub struct ShutdownReport {
    pub errored_scans: Vec<(ScanId, String)>,
}

impl ShutdownReport {
    /// Renders the report the way an operator would want to read it from
    /// a log line: one `scan = reason` entry per line, sorted.
    pub fn render(&self) -> String {
        if self.errored_scans.is_empty() {
            return "no errored scans".to_string();
        }
        self.errored_scans
            .iter()
            .map(|(scan, reason)| format!("{scan}: {reason}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct SdpTransfer {
    config: Config,
    cancel: CancellationToken,
    ledger: Arc<ErrorLedger>,
}

impl SdpTransfer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            ledger: Arc::new(ErrorLedger::new()),
        }
    }

    /// The token that a caller (typically the CLI's signal handler) cancels
    /// to begin graceful shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the manager and both workers to completion (i.e. until
    /// cancellation), then joins them and returns the shutdown report.
    pub async fn run(self) -> ShutdownReport {
        let dashboard: Arc<dyn DashboardAdapter> = match &self.config.dashboard_url {
            Some(url) => Arc::new(HttpDashboard::new(url.clone(), self.config.dashboard_timeout)),
            None => Arc::new(NoopDashboard),
        };
        let stat_binary = Arc::new(ExternalStatBinary::new(self.config.stat_binary.clone()));
        let quiescence = Arc::new(QuiescenceTracker::new(self.config.quiescence_cycles));

        let (manager, process_rx, transfer_rx) = ScanManager::new(
            self.config.local_root.clone(),
            self.config.remote_root.clone(),
            self.config.subsystem.clone(),
            self.config.poll_interval,
            dashboard,
            self.ledger.clone(),
            quiescence.clone(),
            self.cancel.clone(),
        );

        let process = ScanProcess::new(
            self.config.local_root.clone(),
            stat_binary,
            quiescence.clone(),
            self.ledger.clone(),
            self.cancel.clone(),
        );
        let transfer = ScanTransfer::new(
            self.config.local_root.clone(),
            self.config.remote_root.clone(),
            quiescence,
            self.ledger.clone(),
            self.cancel.clone(),
        );

        info!(
            local = %self.config.local_root.display(),
            remote = %self.config.remote_root.display(),
            subsystem = %self.config.subsystem,
            "sdp_transfer starting"
        );

        let manager_handle = tokio::spawn(async move { manager.run().await });
        let process_handle = tokio::spawn(async move { process.run(process_rx).await });
        let transfer_handle = tokio::spawn(async move { transfer.run(transfer_rx).await });

        let _ = tokio::join!(manager_handle, process_handle, transfer_handle);

        info!("sdp_transfer shut down");
        ShutdownReport {
            errored_scans: self.ledger.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    fn scan_id() -> ScanId {
        ScanId::new("eb-01", "pst-low", "scan-01")
    }

    /// A stand-in statistics binary that actually honors the pair → stat-file
    /// contract (spec §6): it `touch`es its third argument. Plain `true`
    /// would return exit 0 without creating the stat file, which would wedge
    /// `is_processing_completed()` forever and make this test meaningless.
    fn fake_stat_binary(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("fake_stat_binary.sh");
        fs::write(&path, "#!/bin/sh\ntouch \"$3\"\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    fn config(local: &std::path::Path, remote: &std::path::Path, stat_binary: PathBuf) -> Config {
        Config {
            local_root: local.to_path_buf(),
            remote_root: remote.to_path_buf(),
            subsystem: "pst-low".to_string(),
            dashboard_url: None,
            poll_interval: Duration::from_millis(20),
            quiescence_cycles: 1,
            dashboard_timeout: Duration::from_secs(1),
            stat_binary,
        }
    }

    #[tokio::test]
    async fn happy_path_scan_is_transferred_and_removed() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let bin_dir = tempfile::tempdir().unwrap();
        let local_root = scan_id().resolve(local_dir.path());
        fs::create_dir_all(local_root.join("data")).unwrap();
        fs::create_dir_all(local_root.join("weights")).unwrap();
        fs::write(local_root.join("data/0001.dada"), b"voltage").unwrap();
        fs::write(local_root.join("weights/0001.dada"), b"weights").unwrap();
        fs::write(local_root.join("scan_completed"), b"").unwrap();

        let stat_binary = fake_stat_binary(bin_dir.path());
        let supervisor = SdpTransfer::new(config(local_dir.path(), remote_dir.path(), stat_binary));
        let cancel = supervisor.cancellation_token();

        let handle = tokio::spawn(supervisor.run());
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        let report = handle.await.unwrap();

        assert!(!local_root.exists(), "completed scan should be cleaned up");
        assert!(report.errored_scans.is_empty());
    }

    #[test]
    fn shutdown_report_renders_errored_scans_sorted() {
        let report = ShutdownReport {
            errored_scans: vec![
                (ScanId::new("eb-01", "pst-low", "scan-02"), "fatal stat failure".to_string()),
            ],
        };
        assert_eq!(report.render(), "eb-01/pst-low/scan-02: fatal stat failure");
    }

    #[test]
    fn shutdown_report_renders_empty_case() {
        let report = ShutdownReport { errored_scans: vec![] };
        assert_eq!(report.render(), "no errored scans");
    }
}
