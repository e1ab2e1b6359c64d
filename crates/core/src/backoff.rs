// SPDX-License-Identifier: MIT

//! Exponential backoff shared by stat-binary retries (spec §4.E) and
//! file-copy retries (spec §4.F).

use std::time::Duration;

/// Exponential backoff: `initial * factor^attempt`, capped at `cap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// The policy named in spec §4.E: initial 1s, factor 2, cap 60s, 5 attempts.
    pub const STAT_RETRY: BackoffPolicy = BackoffPolicy {
        initial: Duration::from_secs(1),
        factor: 2,
        cap: Duration::from_secs(60),
        max_attempts: 5,
    };

    /// The policy named in spec §4.F: same schedule, 3 attempts before a
    /// file is marked errored for this pass.
    pub const FILE_RETRY: BackoffPolicy = BackoffPolicy {
        initial: Duration::from_secs(1),
        factor: 2,
        cap: Duration::from_secs(60),
        max_attempts: 3,
    };

    /// The policy named in spec §5 for Dashboard registration: same
    /// schedule, 3 attempts before the scan is left registered-pending
    /// until the next discovery poll.
    pub const DASHBOARD_RETRY: BackoffPolicy = BackoffPolicy {
        initial: Duration::from_secs(1),
        factor: 2,
        cap: Duration::from_secs(60),
        max_attempts: 3,
    };

    /// The delay to wait before the given attempt number (0-indexed: the
    /// delay awaited *after* the first failure is `delay_for(0)`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.factor.saturating_pow(attempt);
        let millis = self.initial.as_millis().saturating_mul(scaled as u128);
        let capped = millis.min(self.cap.as_millis());
        Duration::from_millis(capped as u64)
    }

    pub fn exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}
