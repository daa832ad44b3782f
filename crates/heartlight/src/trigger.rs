//! Trigger detection
//!
//! A trigger compares a query (e.g. detected peak positions) against an index
//! into a reference buffer (by default its centre, "now" minus half a
//! window). Two detectors are provided:
//!
//! - [`TriggerDetector`] fires whenever the closest query value gets strictly
//!   closer to the index than ever before. The baseline only shrinks, so
//!   firings thin out until [`TriggerDetector::update_index`] rearms it.
//! - [`CrossingDetector`] fires when the nearest query value moves from one
//!   side of the index to the other, once per crossing.
//!
//! Either can head a [`TriggerChain`], whose remaining steps post-process
//! the firing flag.

use crate::buffer::Series;
use crate::chain::Chain;
use crate::error::{Error, Result};
use crate::signal::Signal;

/// First stage of a trigger chain.
pub trait TriggerSource: Send {
    fn evaluate(&mut self, reference: &Series, query: &[f64], auto_index: bool) -> Result<Signal>;
}

/// Nearest query value to `index` as `(index - value)`, ties to the first.
fn nearest_signed(index: usize, query: &[f64]) -> Option<f64> {
    query
        .iter()
        .map(|q| index as f64 - q)
        .fold(None, |best: Option<f64>, d| match best {
            Some(b) if b.abs() <= d.abs() => Some(b),
            _ => Some(d),
        })
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDetector {
    index: usize,
    best: Option<f64>,
}

impl TriggerDetector {
    pub fn new(index: usize) -> Self {
        Self { index, best: None }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Smallest distance seen since the index was last set.
    pub fn best_distance(&self) -> Option<f64> {
        self.best
    }

    /// Move the index and rearm.
    pub fn update_index(&mut self, index: usize) {
        self.index = index;
        self.best = None;
    }

    /// Evaluate one observation.
    ///
    /// With `auto_index` the index follows the reference's centre (rearming
    /// if that moves it). The first observation after (re)arming records a
    /// baseline without firing. Empty reference or query never fires and
    /// leaves the baseline alone.
    pub fn evaluate(&mut self, reference: &Series, query: &[f64], auto_index: bool) -> bool {
        if auto_index && reference.centre_index != self.index {
            self.update_index(reference.centre_index);
        }
        if reference.is_empty() || query.is_empty() {
            return false;
        }
        let Some(distance) = nearest_signed(self.index, query).map(f64::abs) else {
            return false;
        };

        match self.best {
            Some(best) if distance < best => {
                self.best = Some(distance);
                true
            }
            Some(_) => false,
            None => {
                self.best = Some(distance);
                false
            }
        }
    }
}

impl TriggerSource for TriggerDetector {
    fn evaluate(&mut self, reference: &Series, query: &[f64], auto_index: bool) -> Result<Signal> {
        Ok(Signal::Flag(TriggerDetector::evaluate(
            self, reference, query, auto_index,
        )))
    }
}

/// Fires when the nearest query value crosses the index.
///
/// Tracks the signed distance `index - nearest`; a move from negative
/// (value still ahead of the index) to zero or positive fires once.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingDetector {
    index: usize,
    previous: Option<f64>,
}

impl CrossingDetector {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            previous: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn update_index(&mut self, index: usize) {
        self.index = index;
        self.previous = None;
    }

    pub fn evaluate(&mut self, reference: &Series, query: &[f64], auto_index: bool) -> bool {
        if auto_index && reference.centre_index != self.index {
            self.update_index(reference.centre_index);
        }
        if reference.is_empty() || query.is_empty() {
            return false;
        }
        let Some(distance) = nearest_signed(self.index, query) else {
            return false;
        };

        let fired = matches!(self.previous, Some(prev) if prev < 0.0 && distance >= 0.0);
        self.previous = Some(distance);
        fired
    }
}

impl TriggerSource for CrossingDetector {
    fn evaluate(&mut self, reference: &Series, query: &[f64], auto_index: bool) -> Result<Signal> {
        Ok(Signal::Flag(CrossingDetector::evaluate(
            self, reference, query, auto_index,
        )))
    }
}

/// A trigger source followed by steps that must yield a flag.
pub struct TriggerChain {
    source: Box<dyn TriggerSource>,
    steps: Chain,
    auto_index: bool,
}

impl TriggerChain {
    pub fn new(source: impl TriggerSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            steps: Chain::new(),
            auto_index: true,
        }
    }

    pub fn with_steps(mut self, steps: Chain) -> Self {
        self.steps = steps;
        self
    }

    /// Keep the source's own index instead of the reference centre.
    pub fn fixed_index(mut self) -> Self {
        self.auto_index = false;
        self
    }

    pub fn evaluate(&mut self, reference: &Series, query: &[f64]) -> Result<bool> {
        let head = self.source.evaluate(reference, query, self.auto_index)?;
        let result = self.steps.run(head)?;
        result.as_flag().ok_or_else(|| Error::InvalidChain {
            index: self.steps.len(),
            step: "result".to_string(),
            reason: format!("trigger chain must end in a flag, got {}", result.describe()),
        })
    }
}

impl std::fmt::Debug for TriggerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerChain")
            .field("steps", &self.steps)
            .field("auto_index", &self.auto_index)
            .finish_non_exhaustive()
    }
}
