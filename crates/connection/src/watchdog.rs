//! Heartbeat watchdog.
//!
//! Detects a controller that keeps its socket open but stops answering.
//! While armed it ticks every heartbeat interval; the owner probes the
//! controller on each tick and asks [`HeartbeatWatchdog::is_expired`]
//! whether the silence has lasted too long.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Heartbeat ticker plus the time of the last inbound frame.
pub struct HeartbeatWatchdog {
    interval: Duration,
    dead_peer_timeout: Duration,
    ticker: Option<Interval>,
    last_inbound_at: Instant,
}

impl HeartbeatWatchdog {
    /// Creates a disarmed watchdog.
    pub fn new(interval: Duration, dead_peer_timeout: Duration) -> Self {
        Self {
            interval,
            dead_peer_timeout,
            ticker: None,
            last_inbound_at: Instant::now(),
        }
    }

    /// Starts ticking one interval after `now` and resets the liveness clock.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn arm(&mut self, now: Instant) {
        let mut ticker = tokio::time::interval_at(now + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        self.last_inbound_at = now;
    }

    /// Stops ticking. Safe to call when not armed.
    pub fn disarm(&mut self) {
        self.ticker = None;
    }

    pub fn is_armed(&self) -> bool {
        self.ticker.is_some()
    }

    /// Records inbound activity.
    pub fn touch(&mut self, now: Instant) {
        self.last_inbound_at = now;
    }

    pub fn last_inbound_at(&self) -> Instant {
        self.last_inbound_at
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_inbound_at)
    }

    /// `true` once the silence strictly exceeds the dead-peer timeout.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.elapsed(now) > self.dead_peer_timeout
    }

    /// Resolves on the next tick. Never resolves while disarmed.
    ///
    /// Cancel safe.
    pub async fn tick(&mut self) -> Instant {
        match self.ticker.as_mut() {
            Some(ticker) => ticker.tick().await,
            None => std::future::pending().await,
        }
    }
}
