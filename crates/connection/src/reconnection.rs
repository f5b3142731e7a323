//! Fixed-delay reconnect timer.
//!
//! Holds at most one pending sleep. Scheduling while a sleep is pending is
//! refused rather than stacked, so a transport error followed by a close
//! for the same failure can never produce two reconnect attempts.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;

/// Single pending reconnect deadline.
pub struct ReconnectTimer {
    delay: Duration,
    pending: Option<Pin<Box<Sleep>>>,
}

impl ReconnectTimer {
    /// Creates an idle timer that waits `delay` once scheduled.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms the timer. Returns `false`, leaving the existing deadline
    /// untouched, if one is already pending.
    pub fn schedule(&mut self) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(Box::pin(tokio::time::sleep(self.delay)));
        true
    }

    /// Drops the pending sleep. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Resolves when the pending sleep elapses, then clears it. Never
    /// resolves while nothing is pending.
    ///
    /// Cancel safe: dropping the future keeps the deadline.
    pub async fn fired(&mut self) {
        match self.pending.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.pending = None;
            }
            None => std::future::pending().await,
        }
    }
}
