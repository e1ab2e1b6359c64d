// SPDX-License-Identifier: MIT

//! Command-line contract (spec §6):
//! `sdp_transfer [-h] [--data_product_dashboard URL] [-v] LOCAL_PATH REMOTE_PATH SUBSYSTEM`

use std::path::PathBuf;

use clap::Parser;
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "sdp_transfer", version, about = "PST data product transfer")]
pub struct Args {
    /// Existing local capture directory.
    pub local_path: PathBuf,

    /// Existing, writable remote destination directory.
    pub remote_path: PathBuf,

    /// Subdirectory name shared by both roots.
    pub subsystem: String,

    /// Data Product Dashboard base URL; registration is skipped when unset.
    #[arg(long = "data_product_dashboard")]
    pub data_product_dashboard: Option<Url>,

    /// Raise the log level from info to debug.
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_positionals() {
        let args = Args::parse_from(["sdp_transfer", "/local", "/remote", "pst-low"]);
        assert_eq!(args.local_path, PathBuf::from("/local"));
        assert_eq!(args.remote_path, PathBuf::from("/remote"));
        assert_eq!(args.subsystem, "pst-low");
        assert!(args.data_product_dashboard.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn parses_optional_flags() {
        let args = Args::parse_from([
            "sdp_transfer",
            "--data_product_dashboard",
            "http://dashboard.example/",
            "-v",
            "/local",
            "/remote",
            "pst-low",
        ]);
        assert!(args.verbose);
        assert_eq!(
            args.data_product_dashboard.unwrap().as_str(),
            "http://dashboard.example/"
        );
    }
}
