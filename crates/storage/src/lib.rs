// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! sdp-storage: the filesystem-facing layer. Everything here is
//! synchronous `std::fs`; callers on the async side route through
//! `tokio::task::spawn_blocking` where needed.

pub mod file;
pub mod metadata;
pub mod scan;

pub use file::{checksum_file, VoltageRecorderFile};
pub use metadata::DataProduct;
pub use scan::{Pair, Scan, VoltageRecorderScan};
