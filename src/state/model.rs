/// Lifecycle of one crop session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Loading,
    Ready,
    /// A drag is in progress; viewport zoom and pan are suspended.
    Cropping,
    Committing,
    Closed,
    Error,
}

impl SessionState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }

    /// States in which gestures edit the crop box.
    pub const fn accepts_gestures(self) -> bool {
        matches!(self, Self::Ready | Self::Cropping)
    }
}
