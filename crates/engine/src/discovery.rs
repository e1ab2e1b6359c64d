// SPDX-License-Identifier: MIT

//! Walks `<root>/<eb_id>/<subsystem>/<scan_id>/` to find scans for a fixed
//! subsystem, and orders them chronologically (spec §4.D).

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use sdp_core::{ScanId, TransferError};

/// One discovered scan directory, with the directory mtime used to order
/// work chronologically.
#[derive(Debug, Clone)]
pub struct Discovered {
    pub scan_id: ScanId,
    pub mtime: SystemTime,
}

/// Lists every scan directory under `root` for `subsystem`, ordered by
/// directory mtime ascending (oldest first), lexicographic `ScanId` as
/// the tiebreak for determinism when mtimes collide.
pub fn discover_scans(root: &Path, subsystem: &str) -> Result<Vec<Discovered>, TransferError> {
    let mut found = Vec::new();

    let eb_dirs = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(source) => {
            return Err(TransferError::Io {
                scan: ScanId::new("", subsystem, ""),
                path: root.to_path_buf(),
                source,
            })
        }
    };

    for eb_entry in eb_dirs {
        let eb_entry = eb_entry.map_err(|source| TransferError::Io {
            scan: ScanId::new("", subsystem, ""),
            path: root.to_path_buf(),
            source,
        })?;
        if !eb_entry.path().is_dir() {
            continue;
        }
        let eb_id = eb_entry.file_name().to_string_lossy().to_string();
        let subsystem_dir = eb_entry.path().join(subsystem);
        let scan_dirs = match fs::read_dir(&subsystem_dir) {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(TransferError::Io {
                    scan: ScanId::new(&eb_id, subsystem, ""),
                    path: subsystem_dir,
                    source,
                })
            }
        };

        for scan_entry in scan_dirs {
            let scan_entry = scan_entry.map_err(|source| TransferError::Io {
                scan: ScanId::new(&eb_id, subsystem, ""),
                path: subsystem_dir.clone(),
                source,
            })?;
            if !scan_entry.path().is_dir() {
                continue;
            }
            let scan_id_str = scan_entry.file_name().to_string_lossy().to_string();
            let scan_id = ScanId::new(&eb_id, subsystem, &scan_id_str);
            let meta = scan_entry.metadata().map_err(|source| TransferError::Io {
                scan: scan_id.clone(),
                path: scan_entry.path(),
                source,
            })?;
            let mtime = meta.modified().map_err(|source| TransferError::Io {
                scan: scan_id.clone(),
                path: scan_entry.path(),
                source,
            })?;
            found.push(Discovered { scan_id, mtime });
        }
    }

    found.sort_by(|a, b| a.mtime.cmp(&b.mtime).then_with(|| a.scan_id.cmp(&b.scan_id)));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn discover_scans_orders_by_mtime_then_id() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("eb-01/pst-low/scan-b")).unwrap();
        sleep(Duration::from_millis(10));
        fs::create_dir_all(root.join("eb-01/pst-low/scan-a")).unwrap();

        let scans = discover_scans(root, "pst-low").unwrap();
        let ids: Vec<_> = scans.iter().map(|d| d.scan_id.scan_id.clone()).collect();
        assert_eq!(ids, vec!["scan-b".to_string(), "scan-a".to_string()]);
    }

    #[test]
    fn discover_scans_ignores_other_subsystems() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("eb-01/pst-low/scan-a")).unwrap();
        fs::create_dir_all(root.join("eb-01/pst-high/scan-z")).unwrap();

        let scans = discover_scans(root, "pst-low").unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].scan_id.subsystem_id, "pst-low");
    }

    #[test]
    fn discover_scans_returns_empty_for_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let scans = discover_scans(&missing, "pst-low").unwrap();
        assert!(scans.is_empty());
    }
}
