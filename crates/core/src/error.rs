// SPDX-License-Identifier: MIT

//! Error taxonomy shared across the transfer engine (spec §7).

use std::path::PathBuf;

use crate::scan_id::ScanId;

/// The taxonomy of errors a worker can encounter while driving a scan
/// through its lifecycle. Every variant carries enough context (scan
/// triple, path where applicable) to be logged usefully on its own.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("{scan}: not found: {path}")]
    NotFound { scan: ScanId, path: PathBuf },

    #[error("{scan}: io error on {path}: {source}")]
    Io {
        scan: ScanId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{scan}: checksum mismatch on {path}")]
    ChecksumMismatch { scan: ScanId, path: PathBuf },

    #[error("{scan}: subprocess failed (exit={exit_code:?}, retryable={retryable})")]
    SubprocessFailed {
        scan: ScanId,
        exit_code: Option<i32>,
        retryable: bool,
    },

    #[error("dashboard unavailable: {reason}")]
    DashboardUnavailable { reason: String },

    #[error("{scan}: cancelled")]
    Cancelled { scan: ScanId },

    #[error("{scan}: invariant violation: {detail}")]
    InvariantViolation { scan: ScanId, detail: String },
}

impl TransferError {
    /// Whether this error's cause is expected to resolve itself on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Io { .. } | TransferError::ChecksumMismatch { .. } => true,
            TransferError::SubprocessFailed { retryable, .. } => *retryable,
            TransferError::DashboardUnavailable { .. } => true,
            TransferError::NotFound { .. }
            | TransferError::Cancelled { .. }
            | TransferError::InvariantViolation { .. } => false,
        }
    }

    /// A short machine-stable tag for the taxonomy kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::NotFound { .. } => "not_found",
            TransferError::Io { .. } => "io_error",
            TransferError::ChecksumMismatch { .. } => "checksum_mismatch",
            TransferError::SubprocessFailed { .. } => "subprocess_failed",
            TransferError::DashboardUnavailable { .. } => "dashboard_unavailable",
            TransferError::Cancelled { .. } => "cancelled",
            TransferError::InvariantViolation { .. } => "invariant_violation",
        }
    }
}
