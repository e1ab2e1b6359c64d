// SPDX-License-Identifier: MIT

//! The external statistics binary contract (spec §6): one subprocess
//! invocation per pair, mapped to `Ok | Retryable | Fatal`.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use sdp_core::{ScanId, TransferError};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// BSD sysexits' `EX_TEMPFAIL`: the convention this crate uses to decide
/// whether a nonzero exit is transient (spec leaves "known transient
/// signals" unspecified; this is the fixed convention, documented here
/// rather than guessed at each call site).
pub const EX_TEMPFAIL: i32 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOutcome {
    Ok,
    Retryable,
    Fatal,
}

/// Runs the configured statistics binary against one pair. `cancel` is
/// observed for the duration of the invocation: on cancellation the child
/// is killed and the partial output file removed (spec §5/§7).
#[async_trait]
pub trait StatBinaryAdapter: Send + Sync {
    async fn run(
        &self,
        scan: &ScanId,
        data_path: &Path,
        weights_path: &Path,
        stat_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<StatOutcome, TransferError>;
}

/// Spawns the configured executable as a child process, mirroring its
/// stdout to the log without otherwise parsing it (spec §6).
#[derive(Debug, Clone)]
pub struct ExternalStatBinary {
    program: std::path::PathBuf,
}

impl ExternalStatBinary {
    pub fn new(program: impl Into<std::path::PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl StatBinaryAdapter for ExternalStatBinary {
    async fn run(
        &self,
        scan: &ScanId,
        data_path: &Path,
        weights_path: &Path,
        stat_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<StatOutcome, TransferError> {
        let child = Command::new(&self.program)
            .arg(data_path)
            .arg(weights_path)
            .arg(stat_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransferError::Io {
                scan: scan.clone(),
                path: self.program.clone(),
                source,
            })?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Dropping `child` here (via select's cancellation of this
                // branch's future) kills it, since `kill_on_drop` is set.
                let _ = tokio::fs::remove_file(stat_path).await;
                return Err(TransferError::Cancelled { scan: scan.clone() });
            }
            result = child.wait_with_output() => {
                result.map_err(|source| TransferError::Io {
                    scan: scan.clone(),
                    path: self.program.clone(),
                    source,
                })?
            }
        };

        if !output.stdout.is_empty() {
            tracing::debug!(
                scan = %scan,
                program = %self.program.display(),
                stdout = %String::from_utf8_lossy(&output.stdout),
                "stat binary output"
            );
        }

        let exit_code = output.status.code();
        match exit_code {
            Some(0) => Ok(StatOutcome::Ok),
            Some(code) if code == EX_TEMPFAIL => Ok(StatOutcome::Retryable),
            _ => Ok(StatOutcome::Fatal),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Hands back a scripted sequence of outcomes, one per call; the last
    /// scripted outcome repeats once the queue is drained.
    #[derive(Clone, Default)]
    pub struct FakeStatBinary {
        outcomes: Arc<Mutex<VecDeque<StatOutcome>>>,
        calls: Arc<Mutex<Vec<std::path::PathBuf>>>,
    }

    impl FakeStatBinary {
        pub fn new(outcomes: impl IntoIterator<Item = StatOutcome>) -> Self {
            Self {
                outcomes: Arc::new(Mutex::new(outcomes.into_iter().collect())),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn always(outcome: StatOutcome) -> Self {
            Self::new([outcome])
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl StatBinaryAdapter for FakeStatBinary {
        async fn run(
            &self,
            _scan: &ScanId,
            _data_path: &Path,
            _weights_path: &Path,
            stat_path: &Path,
            _cancel: &CancellationToken,
        ) -> Result<StatOutcome, TransferError> {
            self.calls.lock().push(stat_path.to_path_buf());
            let mut outcomes = self.outcomes.lock();
            let outcome = if outcomes.len() > 1 {
                outcomes.pop_front().unwrap_or(StatOutcome::Ok)
            } else {
                outcomes.front().copied().unwrap_or(StatOutcome::Ok)
            };
            Ok(outcome)
        }
    }
}
