// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! sdp-daemon: assembles `sdp-engine`'s workers into the running
//! `sdp_transfer` process (spec §4.G), and resolves the configuration they
//! run with (spec §6).

pub mod config;
pub mod supervisor;

pub use config::Config;
pub use supervisor::{SdpTransfer, ShutdownReport};
