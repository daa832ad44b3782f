//! Timed lighting actions
//!
//! Ramps and pulses write into the shared [`FixtureState`] over time. Each
//! write is one channel update under the state's write lock; nothing is held
//! across a sleep. Concurrent actions on the same fixtures interleave and the
//! last write wins.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::events::{action, Action};
use crate::fixtures::{Channel, FixtureId, FixtureState};
use crate::shared::{self, Shared};
use crate::signal::Signal;

/// Linear interpolation from `start` to `end`, clamped once `elapsed`
/// reaches `duration`.
pub fn ramp_value(start: f64, end: f64, elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return end;
    }
    let progress = (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0);
    start + (end - start) * progress
}

const MIN_STEP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq)]
struct RampChannel {
    channel: Channel,
    from: Vec<f64>,
    to: Vec<f64>,
}

/// Step a set of fixtures from one level to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Ramp {
    fixtures: Vec<FixtureId>,
    channels: Vec<RampChannel>,
    duration: Duration,
    step: Duration,
}

fn per_fixture(values: Signal, count: usize) -> Result<Vec<f64>> {
    match values {
        Signal::Scalar(v) => Ok(vec![v; count]),
        Signal::Array(values) if values.len() == count => Ok(values),
        other => Err(Error::shape(
            format!("{count} ramp values"),
            other.describe(),
        )),
    }
}

impl Ramp {
    pub fn new(fixtures: Vec<FixtureId>, duration: Duration, step: Duration) -> Self {
        Self {
            fixtures,
            channels: Vec::new(),
            duration,
            step: step.max(MIN_STEP),
        }
    }

    /// Add a channel ramping `from` → `to` (scalars broadcast).
    pub fn channel(
        mut self,
        channel: Channel,
        from: impl Into<Signal>,
        to: impl Into<Signal>,
    ) -> Result<Self> {
        let count = self.fixtures.len();
        self.channels.push(RampChannel {
            channel,
            from: per_fixture(from.into(), count)?,
            to: per_fixture(to.into(), count)?,
        });
        Ok(self)
    }

    /// Ramp every fixture of `channels` from its previous to its current
    /// values, as left by the last mapping update.
    pub fn from_previous(
        state: &FixtureState,
        channels: &[Channel],
        duration: Duration,
        step: Duration,
    ) -> Self {
        let mut ramp = Self::new(state.fixtures().to_vec(), duration, step);
        for &channel in channels {
            ramp.channels.push(RampChannel {
                channel,
                from: state.previous(channel).to_vec(),
                to: state.current(channel).to_vec(),
            });
        }
        ramp
    }

    /// Ramp every fixture from what it currently shows to `targets`, one
    /// entry per channel. Nothing is written until the ramp runs.
    pub fn towards(
        state: &FixtureState,
        targets: Vec<(Channel, Vec<f64>)>,
        duration: Duration,
        step: Duration,
    ) -> Result<Self> {
        let mut ramp = Self::new(state.fixtures().to_vec(), duration, step);
        for (channel, to) in targets {
            ramp = ramp.channel(channel, state.current(channel).to_vec(), to)?;
        }
        Ok(ramp)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn write(&self, state: &Shared<FixtureState>, elapsed: Duration) -> Result<()> {
        let mut state = shared::write(state);
        for ramp in &self.channels {
            let values: Vec<f64> = ramp
                .from
                .iter()
                .zip(&ramp.to)
                .map(|(from, to)| ramp_value(*from, *to, elapsed, self.duration))
                .collect();
            state.update_channel_at(ramp.channel, &self.fixtures, values)?;
        }
        Ok(())
    }

    /// Write a value every `step` until `duration` has passed, then the
    /// end values.
    pub async fn run(&self, state: &Shared<FixtureState>) -> Result<()> {
        let start = Instant::now();
        let mut steps = 0u32;
        loop {
            let elapsed = start.elapsed();
            if elapsed >= self.duration {
                self.write(state, self.duration)?;
                break;
            }
            self.write(state, elapsed)?;
            steps += 1;
            trace!(step = steps, elapsed_ms = elapsed.as_millis() as u64, "ramp step");
            tokio::time::sleep(self.step).await;
        }
        debug!(
            fixtures = self.fixtures.len(),
            steps,
            duration_ms = self.duration.as_millis() as u64,
            "ramp finished"
        );
        Ok(())
    }

    pub fn into_action(self, state: Shared<FixtureState>) -> Action {
        action(move || {
            let ramp = self.clone();
            let state = state.clone();
            async move { Ok(ramp.run(&state).await?) }
        })
    }
}

/// Set a level, wait, set another.
#[derive(Debug, Clone, PartialEq)]
pub struct Pulse {
    pub fixtures: Vec<FixtureId>,
    pub channel: Channel,
    pub on: f64,
    pub off: f64,
    pub wait: Duration,
    /// Go to `off` first and end on `on`.
    pub off_first: bool,
}

impl Pulse {
    /// Intensity pulse: on, wait, off.
    pub fn intensity(fixtures: Vec<FixtureId>, on: f64, off: f64, wait: Duration) -> Self {
        Self {
            fixtures,
            channel: Channel::Intensity,
            on,
            off,
            wait,
            off_first: false,
        }
    }

    pub async fn run(&self, state: &Shared<FixtureState>) -> Result<()> {
        let (first, second) = if self.off_first {
            (self.off, self.on)
        } else {
            (self.on, self.off)
        };
        shared::write(state).update_channel_at(self.channel, &self.fixtures, first)?;
        tokio::time::sleep(self.wait).await;
        shared::write(state).update_channel_at(self.channel, &self.fixtures, second)?;
        Ok(())
    }

    pub fn into_action(self, state: Shared<FixtureState>) -> Action {
        action(move || {
            let pulse = self.clone();
            let state = state.clone();
            async move { Ok(pulse.run(&state).await?) }
        })
    }
}
