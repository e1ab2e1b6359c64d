// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! sdp-adapters: trait seams for the two external collaborators the
//! engine talks to — the statistics binary and the Data Product
//! Dashboard — each with a real and a fake implementation.

pub mod dashboard;
pub mod stat_binary;

pub use dashboard::{DashboardAdapter, HttpDashboard, NoopDashboard};
pub use stat_binary::{ExternalStatBinary, StatBinaryAdapter, StatOutcome};

#[cfg(any(test, feature = "test-support"))]
pub use dashboard::fake::FakeDashboard;
#[cfg(any(test, feature = "test-support"))]
pub use stat_binary::fake::FakeStatBinary;
