// SPDX-License-Identifier: MIT

//! `VoltageRecorderFile`: one artifact on one side, local or remote (spec §4.A).

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sdp_core::{ArtifactKind, ScanId, TransferError};

/// Chunk size used when hashing a file. Large enough to amortize syscalls,
/// small enough that a 100GB voltage dump doesn't need to live in memory.
const CHECKSUM_CHUNK_BYTES: usize = 1024 * 1024;

/// One file on one side of a scan: its identity, its `stat()`-observed
/// attributes, and a lazily-computed, cached checksum.
#[derive(Debug, Clone)]
pub struct VoltageRecorderFile {
    path: PathBuf,
    kind: ArtifactKind,
    size: u64,
    mtime: SystemTime,
    checksum: Option<u32>,
}

impl VoltageRecorderFile {
    /// `stat()`s `path` and returns the observed attributes. Does not
    /// compute a checksum; call `checksum()` for that.
    pub fn stat(scan: &ScanId, path: &Path, kind: ArtifactKind) -> Result<Self, TransferError> {
        let meta = fs::metadata(path).map_err(|source| TransferError::Io {
            scan: scan.clone(),
            path: path.to_path_buf(),
            source,
        })?;
        let mtime = meta.modified().map_err(|source| TransferError::Io {
            scan: scan.clone(),
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            kind,
            size: meta.len(),
            mtime,
            checksum: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }

    /// Computes and caches the CRC32 of the file's contents. Idempotent:
    /// repeated calls return the cached value without re-reading.
    pub fn checksum(&mut self, scan: &ScanId) -> Result<u32, TransferError> {
        if let Some(sum) = self.checksum {
            return Ok(sum);
        }
        let sum = checksum_file(scan, &self.path)?;
        self.checksum = Some(sum);
        Ok(sum)
    }

    /// Size and checksum match. `mtime` is advisory only and never
    /// consulted here (spec §4.A).
    pub fn equals(&mut self, other: &mut VoltageRecorderFile, scan: &ScanId) -> Result<bool, TransferError> {
        if self.size != other.size {
            return Ok(false);
        }
        Ok(self.checksum(scan)? == other.checksum(scan)?)
    }
}

/// Reads `path` in fixed-size chunks and folds it into a CRC32. Used both
/// by [`VoltageRecorderFile::checksum`] and directly by the transfer
/// worker when verifying a freshly written remote copy.
pub fn checksum_file(scan: &ScanId, path: &Path) -> Result<u32, TransferError> {
    let mut file = fs::File::open(path).map_err(|source| TransferError::Io {
        scan: scan.clone(),
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; CHECKSUM_CHUNK_BYTES];
    loop {
        let read = file.read(&mut buf).map_err(|source| TransferError::Io {
            scan: scan.clone(),
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scan() -> ScanId {
        ScanId::new("eb-01", "pst-low", "scan-01")
    }

    #[test]
    fn stat_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.dada");
        fs::write(&path, b"hello world").unwrap();

        let f = VoltageRecorderFile::stat(&scan(), &path, ArtifactKind::Data).unwrap();
        assert_eq!(f.size(), 11);
        assert_eq!(f.kind(), ArtifactKind::Data);
    }

    #[test]
    fn stat_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.dada");
        let err = VoltageRecorderFile::stat(&scan(), &path, ArtifactKind::Data).unwrap_err();
        assert!(matches!(err, TransferError::Io { .. }));
    }

    #[test]
    fn checksum_is_cached_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.dada");
        fs::write(&path, b"voltage payload").unwrap();

        let mut f = VoltageRecorderFile::stat(&scan(), &path, ArtifactKind::Data).unwrap();
        let first = f.checksum(&scan()).unwrap();
        let second = f.checksum(&scan()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn equals_compares_size_and_checksum_not_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.dada");
        let b_path = dir.path().join("b.dada");
        fs::write(&a_path, b"same bytes").unwrap();
        fs::write(&b_path, b"same bytes").unwrap();

        let mut a = VoltageRecorderFile::stat(&scan(), &a_path, ArtifactKind::Data).unwrap();
        let mut b = VoltageRecorderFile::stat(&scan(), &b_path, ArtifactKind::Data).unwrap();
        assert!(a.equals(&mut b, &scan()).unwrap());
    }

    #[test]
    fn equals_detects_content_difference_same_size() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.dada");
        let b_path = dir.path().join("b.dada");
        fs::write(&a_path, b"AAAAAAAAAA").unwrap();
        fs::write(&b_path, b"BBBBBBBBBB").unwrap();

        let mut a = VoltageRecorderFile::stat(&scan(), &a_path, ArtifactKind::Data).unwrap();
        let mut b = VoltageRecorderFile::stat(&scan(), &b_path, ArtifactKind::Data).unwrap();
        assert!(!a.equals(&mut b, &scan()).unwrap());
    }

    #[test]
    fn checksum_of_large_file_spans_multiple_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.dada");
        let mut file = fs::File::create(&path).unwrap();
        let chunk = vec![0xABu8; CHECKSUM_CHUNK_BYTES];
        file.write_all(&chunk).unwrap();
        file.write_all(&chunk).unwrap();
        file.write_all(b"tail").unwrap();
        drop(file);

        let sum = checksum_file(&scan(), &path).unwrap();
        // sanity: stable across repeated invocations on the same content.
        let sum_again = checksum_file(&scan(), &path).unwrap();
        assert_eq!(sum, sum_again);
    }

    proptest::proptest! {
        #[test]
        fn equals_is_reflexive_and_content_sensitive(
            a_bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..4096),
            b_bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..4096),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let a_path = dir.path().join("a.dada");
            let b_path = dir.path().join("b.dada");
            fs::write(&a_path, &a_bytes).unwrap();
            fs::write(&b_path, &b_bytes).unwrap();

            let mut a = VoltageRecorderFile::stat(&scan(), &a_path, ArtifactKind::Data).unwrap();
            let mut b = VoltageRecorderFile::stat(&scan(), &b_path, ArtifactKind::Data).unwrap();

            proptest::prop_assert!(a.clone().equals(&mut a.clone(), &scan()).unwrap());
            proptest::prop_assert_eq!(a_bytes == b_bytes, a.equals(&mut b, &scan()).unwrap());
        }
    }
}
