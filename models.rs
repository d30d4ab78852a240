use crate::error::FailureKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_128;

/// Pipeline position of a photo record. Transitions are forward-only except
/// the retry reverts (`ANALYZING -> SHRUNK`, failed sidecar writes staying
/// `ANALYZED`) and the manual `FAILED -> QUEUED` reset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum PhotoState {
    #[default]
    New,
    Shrunk,
    Queued,
    Analyzing,
    Analyzed,
    Written,
    Failed,
}

impl PhotoState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoState::New => "NEW",
            PhotoState::Shrunk => "SHRUNK",
            PhotoState::Queued => "QUEUED",
            PhotoState::Analyzing => "ANALYZING",
            PhotoState::Analyzed => "ANALYZED",
            PhotoState::Written => "WRITTEN",
            PhotoState::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NEW" => Some(PhotoState::New),
            "SHRUNK" => Some(PhotoState::Shrunk),
            "QUEUED" => Some(PhotoState::Queued),
            "ANALYZING" => Some(PhotoState::Analyzing),
            "ANALYZED" => Some(PhotoState::Analyzed),
            "WRITTEN" => Some(PhotoState::Written),
            "FAILED" => Some(PhotoState::Failed),
            _ => None,
        }
    }

    pub const ALL: [PhotoState; 7] = [
        PhotoState::New,
        PhotoState::Shrunk,
        PhotoState::Queued,
        PhotoState::Analyzing,
        PhotoState::Analyzed,
        PhotoState::Written,
        PhotoState::Failed,
    ];
}

/// One vision label that survived confidence filtering, in provider order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLabel {
    pub term: String,
    pub confidence: f32,
}

impl ScoredLabel {
    pub fn new(term: impl Into<String>, confidence: f32) -> Self {
        Self {
            term: term.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PhotoRecord {
    pub identity: String,
    pub path: String,
    pub size: i64,
    pub mtime: i64,
    pub state: PhotoState,
    pub shrink_path: Option<String>,
    pub labels: Vec<ScoredLabel>,
    pub translated_labels: Vec<String>,
    pub attempt_count: i64,
    pub last_error: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

/// Stable key for one physical photo: path plus a size+mtime fingerprint.
/// A rename or an overwrite both yield a new identity, so stale records for
/// the old bytes simply go quiet rather than being mutated.
pub fn photo_identity(path: &Path, size: i64, mtime: i64) -> String {
    let key = format!("{}|{}|{}", path.to_string_lossy(), size, mtime);
    format!("{:032x}", xxh3_128(key.as_bytes()))
}

/// Operator-facing snapshot returned by the `status` command.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusReport {
    pub counts: BTreeMap<String, i64>,
    pub failed: Vec<FailedSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FailedSample {
    pub identity: String,
    pub path: String,
    pub attempt_count: i64,
    pub error_kind: Option<String>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn identity_is_stable_and_sensitive_to_fingerprint() {
        let path = PathBuf::from("/photos/IMG_001.jpg");
        let a = photo_identity(&path, 1024, 1_700_000_000);
        let b = photo_identity(&path, 1024, 1_700_000_000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);

        let moved = photo_identity(&PathBuf::from("/photos/sub/IMG_001.jpg"), 1024, 1_700_000_000);
        assert_ne!(a, moved);
        let rewritten = photo_identity(&path, 2048, 1_700_000_000);
        assert_ne!(a, rewritten);
    }

    #[test]
    fn state_wire_names_round_trip() {
        for state in PhotoState::ALL {
            assert_eq!(PhotoState::parse(state.as_str()), Some(state));
        }
        assert_eq!(PhotoState::parse("nope"), None);
    }
}
