//! The two rates fed by box mutations: debounced history capture and
//! throttled repaint. Both take explicit `Instant`s so they stay testable.

use std::time::{Duration, Instant};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Holds the latest value until no new value has arrived for `quiet`.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    pub const fn quiet_period(&self) -> Duration {
        self.quiet
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Replaces any pending value and restarts the quiet period.
    pub fn notify(&mut self, now: Instant, value: T) {
        self.pending = Some((now, value));
    }

    /// Releases the pending value once the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let ready = self
            .pending
            .as_ref()
            .is_some_and(|(at, _)| now.saturating_duration_since(*at) >= self.quiet);
        if ready {
            self.pending.take().map(|(_, value)| value)
        } else {
            None
        }
    }

    /// Releases the pending value immediately.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(_, value)| value)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// When the pending value will be released, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(at, _)| *at + self.quiet)
    }
}

/// Allows at most one repaint per frame interval while something is dirty.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval: Duration,
    last_frame: Option<Instant>,
    dirty: bool,
}

impl FrameThrottle {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_frame: None,
            dirty: false,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns true (and starts a new frame) when a repaint is due at `now`.
    pub fn begin_frame(&mut self, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }
        let due = self
            .last_frame
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_frame = Some(now);
            self.dirty = false;
        }
        due
    }
}
