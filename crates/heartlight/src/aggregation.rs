//! Multi-buffer aggregation
//!
//! Reduces every registered [`SampleBuffer`](crate::buffer::SampleBuffer) to
//! one value, places it at the key's slot in a working array, and derives
//! named spatial expansions (e.g. anchor values interpolated across every
//! fixture) from that array.
//!
//! ```text
//!   "/aud" ──reduce──▶ slot 2 ─┐
//!   "/brs" ──reduce──▶ slot 0 ─┼─▶ [v0 v1 v2] ──expansion chain──▶ "colours"
//!   "/vn1" ──reduce──▶ slot 1 ─┘
//! ```

use std::collections::{HashMap, HashSet};

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::buffer::SharedBuffer;
use crate::chain::Chain;
use crate::error::{Error, Result};
use crate::gate::{Gating, TickGate};
use crate::registry::BufferRegistry;
use crate::shared;
use crate::signal::Signal;

#[derive(Debug)]
pub struct AggregationArray {
    /// Buffers in registration order; slot 0..n initially follows this order.
    buffers: Vec<(String, SharedBuffer)>,
    positions: HashMap<String, usize>,
    values: Vec<f64>,
    /// Indexed by slot.
    updated: Vec<bool>,
    expansions: Vec<(String, Signal)>,
    gate: TickGate,
    require_full: bool,
}

impl AggregationArray {
    pub fn new<I, S>(buffers: I) -> Self
    where
        I: IntoIterator<Item = (S, SharedBuffer)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let buffers: Vec<(String, SharedBuffer)> = buffers
            .into_iter()
            .map(|(k, b)| (k.into(), b))
            .filter(|(k, _)| seen.insert(k.clone()))
            .collect();
        let positions = buffers
            .iter()
            .enumerate()
            .map(|(slot, (k, _))| (k.clone(), slot))
            .collect();
        let n = buffers.len();

        Self {
            buffers,
            positions,
            values: vec![0.0; n],
            updated: vec![false; n],
            expansions: Vec::new(),
            gate: TickGate::new(),
            require_full: false,
        }
    }

    pub fn from_registry(registry: &BufferRegistry) -> Self {
        Self::new(registry.buffers().map(|(k, b)| (k, b.clone())))
    }

    /// Skip buffers that have not filled yet (warm-up).
    pub fn require_full(mut self, require_full: bool) -> Self {
        self.require_full = require_full;
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The working array, one value per slot.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Keys in slot order.
    pub fn positions(&self) -> Vec<&str> {
        let mut keys: Vec<(&str, usize)> = self
            .positions
            .iter()
            .map(|(k, slot)| (k.as_str(), *slot))
            .collect();
        keys.sort_by_key(|(_, slot)| *slot);
        keys.into_iter().map(|(k, _)| k).collect()
    }

    pub fn position(&self, key: &str) -> Result<usize> {
        self.positions
            .get(key)
            .copied()
            .ok_or_else(|| Error::UnknownKey(key.to_string()))
    }

    /// Reassign slots. Keys not in `mapping` keep their slot.
    ///
    /// The resulting assignment must stay a bijection onto `0..len`; on any
    /// conflict nothing changes.
    pub fn set_positions<'a, I>(&mut self, mapping: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, usize)>,
    {
        let n = self.len();
        let mut next = self.positions.clone();

        for (key, slot) in mapping {
            if !next.contains_key(key) {
                return Err(Error::PositionConflict(format!(
                    "'{key}' is not a registered buffer"
                )));
            }
            if slot >= n {
                return Err(Error::PositionConflict(format!(
                    "slot {slot} for '{key}' is out of range (0..{n})"
                )));
            }
            next.insert(key.to_string(), slot);
        }

        let mut owners: HashMap<usize, &str> = HashMap::new();
        for (key, slot) in &next {
            if let Some(other) = owners.insert(*slot, key.as_str()) {
                return Err(Error::PositionConflict(format!(
                    "'{key}' and '{other}' both assigned slot {slot}"
                )));
            }
        }

        // Carry values and flags along with their keys
        let mut values = vec![0.0; n];
        let mut updated = vec![false; n];
        for (key, old_slot) in &self.positions {
            let new_slot = next[key];
            values[new_slot] = self.values[*old_slot];
            updated[new_slot] = self.updated[*old_slot];
        }

        self.positions = next;
        self.values = values;
        self.updated = updated;
        debug!(positions = ?self.positions(), "aggregation positions set");
        Ok(())
    }

    /// Reduce each buffer to one value with `chain` and write it at the key's
    /// slot.
    ///
    /// All reductions are computed before any slot is written, so a failure
    /// leaves the working array untouched. Empty buffers (and, with
    /// [`require_full`](Self::require_full), partial ones) are skipped.
    pub fn update(&mut self, chain: &Chain) -> Result<()> {
        let mut results = Vec::with_capacity(self.buffers.len());

        for (key, buffer) in &self.buffers {
            let output = {
                let buffer = shared::read(buffer);
                if buffer.is_empty() || (self.require_full && !buffer.is_full()) {
                    trace!(buffer.key = %key, len = buffer.len(), "skipping buffer");
                    continue;
                }
                buffer.transform(chain)?
            };
            let value = output
                .as_scalar()
                .ok_or_else(|| Error::shape(format!("scalar for '{key}'"), output.describe()))?;
            results.push((self.positions[key], value));
        }

        self.updated.iter_mut().for_each(|flag| *flag = false);
        for (slot, value) in results {
            self.updated[slot] = self.values[slot] != value;
            self.values[slot] = value;
        }
        trace!(values = ?self.values, "aggregation updated");
        Ok(())
    }

    /// Gated [`update`](Self::update). Update gating runs when any buffer
    /// received samples since the last pass. Returns whether a pass ran.
    pub fn update_tick(&mut self, chain: &Chain, gating: Gating) -> Result<bool> {
        self.update_tick_at(chain, gating, Instant::now())
    }

    pub fn update_tick_at(&mut self, chain: &Chain, gating: Gating, now: Instant) -> Result<bool> {
        let version = self.combined_version();
        if !self.gate.poll_at(gating, version, now) {
            return Ok(false);
        }
        self.update(chain)?;
        Ok(true)
    }

    fn combined_version(&self) -> u64 {
        self.buffers
            .iter()
            .fold(0u64, |acc, (_, b)| acc.wrapping_add(shared::read(b).version()))
    }

    /// Whether the key's value changed in the last pass.
    pub fn was_updated(&self, key: &str) -> Result<bool> {
        Ok(self.updated[self.position(key)?])
    }

    /// Keys whose value changed in the last pass, in slot order.
    pub fn updated_keys(&self) -> Vec<&str> {
        self.positions()
            .into_iter()
            .filter(|k| self.positions.get(*k).is_some_and(|slot| self.updated[*slot]))
            .collect()
    }

    /// Values for `keys` (all keys when `None`), ordered by slot.
    pub fn get_values(&self, keys: Option<&[&str]>) -> Result<Vec<f64>> {
        let Some(keys) = keys else {
            return Ok(self.values.clone());
        };
        let mut slots = keys
            .iter()
            .map(|k| self.position(k))
            .collect::<Result<Vec<usize>>>()?;
        slots.sort_unstable();
        Ok(slots.into_iter().map(|slot| self.values[slot]).collect())
    }

    /// Run `chain` over the working array.
    ///
    /// The result is cached under `name`. Without a name it is cached under
    /// the next ordinal ("0", "1", ...) unless `return_result` asks for it
    /// directly instead.
    pub fn spatial_expansion(
        &mut self,
        chain: &Chain,
        name: Option<&str>,
        return_result: bool,
    ) -> Result<Option<Signal>> {
        let expanded = chain.run(Signal::Array(self.values.clone()))?;

        let cache_name = match name {
            Some(name) => Some(name.to_string()),
            None if !return_result => Some(self.expansions.len().to_string()),
            None => None,
        };
        let returned = return_result.then(|| expanded.clone());

        if let Some(name) = cache_name {
            trace!(expansion = %name, shape = %expanded.describe(), "expansion cached");
            match self.expansions.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = expanded,
                None => self.expansions.push((name, expanded)),
            }
        }
        Ok(returned)
    }

    pub fn get_expansion(&self, name: &str) -> Result<&Signal> {
        self.expansions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
            .ok_or_else(|| Error::UnknownExpansion(name.to_string()))
    }

    /// Cached expansion names in creation order.
    pub fn expansion_names(&self) -> Vec<&str> {
        self.expansions.iter().map(|(n, _)| n.as_str()).collect()
    }
}
