//! Values persisted across runs: task results, file fingerprints.

use serde::{Deserialize, Serialize};

/// The value produced by a task's last action.
///
/// A string/byte result is fingerprinted as its MD5 digest when persisted;
/// a mapping result is stored verbatim. See the design notes on result
/// digesting for why the two shapes are kept distinct rather than always
/// hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskResultValue {
    /// Opaque text/byte result; persisted as an MD5 digest.
    Text(String),
    /// Structured result; persisted as-is.
    Mapping(serde_json::Map<String, serde_json::Value>),
}

/// `(mtime, size, md5)` fingerprint of a single `file_dep` entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Modification time, seconds since epoch.
    pub mtime: f64,
    /// File size in bytes.
    pub size: u64,
    /// MD5 digest of file content, hex-encoded.
    pub md5: String,
}

impl FileFingerprint {
    /// Compare two fingerprints for the "has this file changed" check
    /// described in the up-to-date classification: timestamp match is
    /// sufficient to call it unchanged without touching size or content.
    #[must_use]
    pub fn mtime_matches(&self, other_mtime: f64) -> bool {
        self.mtime == other_mtime
    }
}
