use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The image could not be loaded; the session is finished.
    Decode,
    /// The crop could not be produced; the box is kept and commit may be retried.
    Extract,
    /// The native re-decode at commit time failed; the session is finished.
    CommitDecode,
    /// A background job exited without reporting back.
    WorkerLost,
}

impl FailureKind {
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Extract)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Decode => "could not load image",
            Self::Extract | Self::CommitDecode => "could not produce crop",
            Self::WorkerLost => "background job lost",
        };
        f.write_str(label)
    }
}

/// A failure reported to the host. `reason` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {reason}")]
pub struct SessionFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl SessionFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            kind.to_string()
        } else {
            reason
        };
        Self { kind, reason }
    }

    /// Builds the reason from `err` and its whole source chain.
    pub fn from_error(kind: FailureKind, err: &(dyn StdError + 'static)) -> Self {
        let mut reason = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            reason.push_str(": ");
            reason.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(kind, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{DecodeError, ExtractError};

    #[test]
    fn reason_includes_source_chain() {
        let err = ExtractError::Decode(DecodeError::EmptyImage);
        let failure = SessionFailure::from_error(FailureKind::CommitDecode, &err);
        assert_eq!(
            failure.reason,
            "failed to decode source at native resolution: decoded image has no pixels"
        );
        assert!(!failure.kind.is_retryable());
    }

    #[test]
    fn empty_reason_falls_back_to_kind_label() {
        let failure = SessionFailure::new(FailureKind::Decode, "  ");
        assert_eq!(failure.reason, "could not load image");
    }
}
