//! Fixed-capacity sample buffer
//!
//! Samples are appended at the tail and evicted from the head, so the buffer
//! always holds the newest `capacity` values in arrival order. Every mutation
//! bumps a version that `transform_tick` uses for update gating.

use std::collections::VecDeque;

use tokio::time::Instant;
use tracing::trace;

use crate::chain::Chain;
use crate::error::Result;
use crate::gate::{Gating, TickGate};
use crate::shared::Shared;
use crate::signal::Signal;

pub type SharedBuffer = Shared<SampleBuffer>;

#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
    version: u64,
    gate: TickGate,
}

impl SampleBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            version: 0,
            gate: TickGate::new(),
        }
    }

    /// Create a buffer holding `contents`, sized to fit them exactly.
    pub fn from_samples(contents: Vec<f64>) -> Self {
        let mut buffer = Self::new(contents.len());
        buffer.set(contents, true);
        buffer
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Monotonic change counter. Zero for a buffer that was never written.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Index of the sample in the middle of a full buffer.
    pub fn centre_index(&self) -> usize {
        self.capacity / 2
    }

    /// Append one sample.
    pub fn push(&mut self, sample: f64) {
        self.enqueue([sample]);
    }

    /// Append samples in order, evicting the oldest beyond capacity.
    pub fn enqueue(&mut self, samples: impl IntoIterator<Item = f64>) {
        let before = self.samples.len();
        let mut added = 0usize;
        for sample in samples {
            self.samples.push_back(sample);
            added += 1;
        }
        if added == 0 {
            return;
        }
        self.evict();
        self.version += 1;
        trace!(added, before, len = self.samples.len(), "enqueued samples");
    }

    /// Replace the contents wholesale.
    ///
    /// With `resize` the capacity becomes `contents.len()` (at least one);
    /// otherwise only the newest `capacity` values are kept.
    pub fn set(&mut self, contents: Vec<f64>, resize: bool) {
        if resize {
            self.capacity = contents.len().max(1);
        }
        self.samples = VecDeque::from(contents);
        self.evict();
        self.version += 1;
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.version += 1;
    }

    fn evict(&mut self) {
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Copy of the samples, oldest first.
    pub fn snapshot(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn series(&self) -> Series {
        Series {
            samples: self.snapshot(),
            centre_index: self.centre_index(),
        }
    }

    /// Run `chain` over a snapshot of the buffer. Never mutates.
    pub fn transform(&self, chain: &Chain) -> Result<Signal> {
        chain.run(Signal::Array(self.snapshot()))
    }

    /// Gated [`transform`](Self::transform). `Ok(None)` when the gate is closed.
    ///
    /// An open gate is consumed even if the chain then fails.
    pub fn transform_tick(&mut self, chain: &Chain, gating: Gating) -> Result<Option<Signal>> {
        self.transform_tick_at(chain, gating, Instant::now())
    }

    pub fn transform_tick_at(
        &mut self,
        chain: &Chain,
        gating: Gating,
        now: Instant,
    ) -> Result<Option<Signal>> {
        if !self.gate.poll_at(gating, self.version, now) {
            return Ok(None);
        }
        self.transform(chain).map(Some)
    }
}

/// Immutable view of a buffer handed to trigger evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub samples: Vec<f64>,
    pub centre_index: usize,
}

impl Series {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<f64>> for Series {
    fn from(samples: Vec<f64>) -> Self {
        let centre_index = samples.len() / 2;
        Self {
            samples,
            centre_index,
        }
    }
}

impl From<&SampleBuffer> for Series {
    fn from(buffer: &SampleBuffer) -> Self {
        buffer.series()
    }
}
