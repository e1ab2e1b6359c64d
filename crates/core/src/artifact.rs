// SPDX-License-Identifier: MIT

//! Artifact kinds inside a scan directory (spec §3).

use serde::{Deserialize, Serialize};

/// The logical kind of one file inside a scan directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// `data/*.dada` — voltage payload.
    Data,
    /// `weights/*.dada` — per-data companion.
    Weights,
    /// `stat/*.h5` — per-pair statistics output.
    Stat,
    /// `scan_configuration.json` / `obs.header`.
    Config,
    /// `data_product.yaml`.
    Metadata,
    /// `scan_completed` / `transfer_completed`.
    Sentinel,
}

crate::simple_display! {
    ArtifactKind {
        Data => "data",
        Weights => "weights",
        Stat => "stat",
        Config => "config",
        Metadata => "metadata",
        Sentinel => "sentinel",
    }
}
