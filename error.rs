use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database Pool Error: {0}")]
    DbPool(#[from] r2d2::Error),

    #[error("Database Error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Vision labeling failed: {0}")]
    Vision(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("External call exceeded deadline of {0} ms")]
    Deadline(u64),

    #[error("External call panicked")]
    CollaboratorPanic,

    #[error("Path Error: {0}")]
    Path(String),

    #[error("Initialization Failed: {0}")]
    Init(String),
}

/// Failure classification stored on a photo record. The wire names are what
/// the `error_kind` column and the status report carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Unreadable or corrupt image. Terminal after a single attempt.
    Decode,
    /// Vision or translation call failed. Retried up to the attempt cap.
    ExternalService,
    /// Sidecar write failed. Retried on every drain, never counts toward
    /// the attempt cap.
    Write,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Decode => "DECODE_ERROR",
            FailureKind::ExternalService => "EXTERNAL_SERVICE_ERROR",
            FailureKind::Write => "WRITE_ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DECODE_ERROR" => Some(FailureKind::Decode),
            "EXTERNAL_SERVICE_ERROR" => Some(FailureKind::ExternalService),
            "WRITE_ERROR" => Some(FailureKind::Write),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_wire_names_round_trip() {
        for kind in [
            FailureKind::Decode,
            FailureKind::ExternalService,
            FailureKind::Write,
        ] {
            assert_eq!(FailureKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FailureKind::parse("BOGUS"), None);
    }
}
