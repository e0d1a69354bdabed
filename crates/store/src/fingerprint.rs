//! File fingerprinting: `(mtime, size, md5)` triples, and the
//! timestamp-first change check from the up-to-date classification.

use crate::error::{Error, Result};
use kiln_task::FileFingerprint;
use md5::{Digest, Md5};
use std::path::Path;

/// Stat and hash a file, producing the fingerprint recorded by
/// `save_success`.
///
/// # Errors
///
/// Returns [`Error::MissingFileDep`] if the file does not exist, or
/// [`Error::Io`] for any other I/O failure.
pub fn compute_fingerprint(path: &Path) -> Result<FileFingerprint> {
    let metadata = std::fs::metadata(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::MissingFileDep { path: path.to_path_buf() }
        } else {
            Error::Io { path: path.to_path_buf(), source }
        }
    })?;
    let mtime = mtime_seconds(&metadata);
    let size = metadata.len();
    let md5 = md5_hex(path)?;
    Ok(FileFingerprint { mtime, size, md5 })
}

/// Hash a file's contents, hex-encoded.
pub fn md5_hex(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(md5_hex_of_bytes(&bytes))
}

/// Hash a byte string, hex-encoded. Used to digest a task's text result
/// the same way `file_dep` content is digested.
#[must_use]
pub fn md5_hex_of_bytes(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn mtime_seconds(metadata: &std::fs::Metadata) -> f64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0.0, |d| d.as_secs_f64())
}

/// Decide whether a `file_dep` has changed since `stored`, per the
/// classification's timestamp-first comparison: an unchanged mtime is
/// sufficient to call the file unchanged without re-reading its content;
/// otherwise fall back to comparing size and then the md5 digest.
pub fn has_changed(stored: &FileFingerprint, path: &Path) -> Result<bool> {
    let metadata = std::fs::metadata(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::MissingFileDep { path: path.to_path_buf() }
        } else {
            Error::Io { path: path.to_path_buf(), source }
        }
    })?;
    let current_mtime = mtime_seconds(&metadata);
    if stored.mtime_matches(current_mtime) {
        return Ok(false);
    }
    if stored.size != metadata.len() {
        return Ok(true);
    }
    let current_md5 = md5_hex(path)?;
    Ok(stored.md5 != current_md5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmodified_file_has_matching_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();
        let fp = compute_fingerprint(&path).unwrap();
        assert_eq!(fp.size, 5);
        assert!(!has_changed(&fp, &path).unwrap());
    }

    #[test]
    fn modified_content_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();
        let fp = compute_fingerprint(&path).unwrap();
        // Force a content change without necessarily moving mtime forward
        // by also bumping size, so the comparison cannot short-circuit on
        // an unchanged mtime in a fast test run.
        std::fs::write(&path, b"hello, world").unwrap();
        assert!(has_changed(&fp, &path).unwrap());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let err = compute_fingerprint(&path).unwrap_err();
        assert!(matches!(err, Error::MissingFileDep { .. }));
    }
}
