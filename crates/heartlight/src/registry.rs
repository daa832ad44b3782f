//! Ingestion context
//!
//! Owns the sample buffers the ingestion adapter writes into, keyed by the
//! address the samples arrive on. One registry is created at startup and
//! handed to whatever receives samples; there is no process-wide state.

use tracing::{debug, trace};

use crate::buffer::{SampleBuffer, SharedBuffer};
use crate::error::{Error, Result};
use crate::shared::{self, shared};

#[derive(Debug, Default, Clone)]
pub struct BufferRegistry {
    buffers: Vec<(String, SharedBuffer)>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one buffer of `capacity` per address.
    pub fn with_keys<I, S>(keys: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for key in keys {
            registry.register(key, capacity);
        }
        registry
    }

    /// Register a buffer under `key`, returning its handle. An existing
    /// buffer under the same key is kept and returned.
    pub fn register(&mut self, key: impl Into<String>, capacity: usize) -> SharedBuffer {
        let key = key.into();
        if let Some(existing) = self.get(&key) {
            return existing;
        }
        debug!(buffer.key = %key, capacity, "registered sample buffer");
        let buffer = shared(SampleBuffer::new(capacity));
        self.buffers.push((key, buffer.clone()));
        buffer
    }

    pub fn get(&self, key: &str) -> Option<SharedBuffer> {
        self.buffers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, b)| b.clone())
    }

    /// Keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.buffers.iter().map(|(k, _)| k.as_str())
    }

    pub fn buffers(&self) -> impl Iterator<Item = (&str, &SharedBuffer)> {
        self.buffers.iter().map(|(k, b)| (k.as_str(), b))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Append samples to the buffer registered under `key`.
    pub fn ingest(&self, key: &str, samples: &[f64]) -> Result<()> {
        let buffer = self
            .get(key)
            .ok_or_else(|| Error::UnknownKey(key.to_string()))?;
        shared::write(&buffer).enqueue(samples.iter().copied());
        trace!(buffer.key = %key, count = samples.len(), "ingested");
        Ok(())
    }

    /// Ingest by message address. Only the first path segment selects the
    /// buffer, so `/ecg/data` lands in `/ecg`.
    pub fn ingest_address(&self, address: &str, samples: &[f64]) -> Result<()> {
        self.ingest(&normalize_address(address), samples)
    }
}

fn normalize_address(address: &str) -> String {
    let first = address
        .split('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("");
    format!("/{first}")
}
