//! Tick gating
//!
//! Decides whether a `*_tick` call should do any work. Update gating follows
//! a change version; time gating keeps a fixed cadence using monotonic
//! `tokio::time::Instant`s (which also honour paused test time).

use std::time::Duration;

use tokio::time::Instant;

use heartconf::GatingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gating {
    /// Run only when new data arrived since the previous tick.
    Update,
    /// Run at most once per `interval`.
    Time { interval: Duration },
}

impl Gating {
    pub fn every(interval: Duration) -> Self {
        Gating::Time { interval }
    }
}

impl From<&GatingConfig> for Gating {
    fn from(config: &GatingConfig) -> Self {
        match config {
            GatingConfig::Update => Gating::Update,
            GatingConfig::Time { interval_ms } => Gating::Time {
                interval: Duration::from_millis(*interval_ms),
            },
        }
    }
}

/// Gate state for one tick consumer.
///
/// A single gate tracks both the last consumed version and the time
/// deadline, so the same consumer can be ticked under either policy.
#[derive(Debug, Clone, Default)]
pub struct TickGate {
    seen_version: u64,
    last_tick: Option<Instant>,
}

impl TickGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the gate against the current clock.
    pub fn poll(&mut self, gating: Gating, version: u64) -> bool {
        self.poll_at(gating, version, Instant::now())
    }

    /// Check the gate at an explicit instant. An open gate is consumed.
    ///
    /// Time gating opens on the first call. After that the deadline advances
    /// by exactly `interval`; if more than a whole interval was missed it
    /// snaps to `now`.
    pub fn poll_at(&mut self, gating: Gating, version: u64, now: Instant) -> bool {
        match gating {
            Gating::Update => {
                if version == self.seen_version {
                    return false;
                }
                self.seen_version = version;
                true
            }
            Gating::Time { interval } => match self.last_tick {
                None => {
                    self.last_tick = Some(now);
                    true
                }
                Some(last) => {
                    if now.saturating_duration_since(last) < interval {
                        return false;
                    }
                    let mut next = last + interval;
                    if now.saturating_duration_since(next) > interval {
                        next = now;
                    }
                    self.last_tick = Some(next);
                    true
                }
            },
        }
    }
}
