use super::model::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    DecodeSucceeded,
    DecodeFailed,
    BeginDrag,
    EndDrag,
    Commit,
    CommitSucceeded,
    /// The crop region was unusable; the box is kept for another attempt.
    CommitRejected,
    /// The source could not be decoded again at native resolution.
    CommitFailed,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: Option<SessionState>,
    pub event: SessionEvent,
    pub to: SessionState,
}

impl StateTransition {
    pub const fn new(from: Option<SessionState>, event: SessionEvent, to: SessionState) -> Self {
        Self { from, event, to }
    }
}
