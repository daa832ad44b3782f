//! Double-buffered fixture state
//!
//! Five channels (intensity, red, green, blue, white), each a current and a
//! previous array with one value per fixture. Updating a channel moves its
//! current values to previous before installing the new ones, so protocol
//! adapters and ramps can see where a channel came from. Channels that an
//! update does not touch keep both arrays.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::trace;

use crate::error::{Error, Result};
use crate::signal::Signal;

pub type FixtureId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Intensity,
    Red,
    Green,
    Blue,
    White,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Intensity,
        Channel::Red,
        Channel::Green,
        Channel::Blue,
        Channel::White,
    ];

    fn index(self) -> usize {
        match self {
            Channel::Intensity => 0,
            Channel::Red => 1,
            Channel::Green => 2,
            Channel::Blue => 3,
            Channel::White => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Intensity => "intensity",
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
            Channel::White => "white",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a mapping writes into: one channel or a colour group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Intensity,
    Red,
    Green,
    Blue,
    White,
    Rgb,
    Rgbw,
}

impl Parameter {
    /// Channels written, in the order a multi-channel result must supply them.
    pub fn channels(self) -> &'static [Channel] {
        match self {
            Parameter::Intensity => &[Channel::Intensity],
            Parameter::Red => &[Channel::Red],
            Parameter::Green => &[Channel::Green],
            Parameter::Blue => &[Channel::Blue],
            Parameter::White => &[Channel::White],
            Parameter::Rgb => &[Channel::Red, Channel::Green, Channel::Blue],
            Parameter::Rgbw => &[Channel::Red, Channel::Green, Channel::Blue, Channel::White],
        }
    }
}

impl FromStr for Parameter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intensity" | "intensities" => Ok(Parameter::Intensity),
            "red" => Ok(Parameter::Red),
            "green" => Ok(Parameter::Green),
            "blue" => Ok(Parameter::Blue),
            "white" => Ok(Parameter::White),
            "rgb" => Ok(Parameter::Rgb),
            "rgbw" => Ok(Parameter::Rgbw),
            _ => Err(Error::InvalidParameter(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ChannelPair {
    current: Vec<f64>,
    previous: Vec<f64>,
}

impl ChannelPair {
    fn zeroed(len: usize) -> Self {
        Self {
            current: vec![0.0; len],
            previous: vec![0.0; len],
        }
    }

    fn install(&mut self, values: Vec<f64>) {
        self.previous = std::mem::replace(&mut self.current, values);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureState {
    fixtures: Vec<FixtureId>,
    anchors: Vec<FixtureId>,
    anchor_positions: Vec<usize>,
    channels: [ChannelPair; 5],
}

impl FixtureState {
    /// All channels start at zero.
    pub fn new(fixtures: Vec<FixtureId>, anchors: &[FixtureId]) -> Result<Self> {
        let len = fixtures.len();
        let mut state = Self {
            fixtures,
            anchors: Vec::new(),
            anchor_positions: Vec::new(),
            channels: std::array::from_fn(|_| ChannelPair::zeroed(len)),
        };
        state.set_anchors(anchors)?;
        Ok(state)
    }

    pub fn fixtures(&self) -> &[FixtureId] {
        &self.fixtures
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    pub fn position_of(&self, id: FixtureId) -> Result<usize> {
        self.fixtures
            .iter()
            .position(|f| *f == id)
            .ok_or(Error::UnknownFixture(id))
    }

    pub fn anchors(&self) -> &[FixtureId] {
        &self.anchors
    }

    /// Indices of the anchors in the fixture list, ascending.
    pub fn anchor_positions(&self) -> &[usize] {
        &self.anchor_positions
    }

    pub fn set_anchors(&mut self, ids: &[FixtureId]) -> Result<()> {
        let mut positions = ids
            .iter()
            .map(|id| self.position_of(*id))
            .collect::<Result<Vec<usize>>>()?;
        positions.sort_unstable();
        positions.dedup();

        self.anchors = positions.iter().map(|p| self.fixtures[*p]).collect();
        self.anchor_positions = positions;
        Ok(())
    }

    /// Normalise a scalar or per-fixture array to `len` values.
    fn expand(&self, channel: Channel, values: Signal) -> Result<Vec<f64>> {
        match values {
            Signal::Scalar(v) => Ok(vec![v; self.len()]),
            Signal::Array(values) if values.len() == self.len() => Ok(values),
            other => Err(Error::shape(
                format!("{} values for {} fixtures", channel, self.len()),
                other.describe(),
            )),
        }
    }

    pub fn update(&mut self, channel: Channel, values: impl Into<Signal>) -> Result<()> {
        self.update_channels(vec![(channel, values.into())])
    }

    /// Update several channels together. Every channel is validated before
    /// any is written. A channel named more than once takes its last value
    /// and is installed once, so its previous values stay those from before
    /// the call.
    pub fn update_channels(&mut self, updates: Vec<(Channel, Signal)>) -> Result<()> {
        let mut validated: Vec<(Channel, Vec<f64>)> = Vec::with_capacity(updates.len());
        for (channel, values) in updates {
            let values = self.expand(channel, values)?;
            match validated.iter_mut().find(|(seen, _)| *seen == channel) {
                Some(slot) => slot.1 = values,
                None => validated.push((channel, values)),
            }
        }

        for (channel, values) in validated {
            trace!(%channel, "channel updated");
            self.channels[channel.index()].install(values);
        }
        Ok(())
    }

    pub fn update_intensity(&mut self, values: impl Into<Signal>) -> Result<()> {
        self.update(Channel::Intensity, values)
    }

    pub fn update_red(&mut self, values: impl Into<Signal>) -> Result<()> {
        self.update(Channel::Red, values)
    }

    pub fn update_green(&mut self, values: impl Into<Signal>) -> Result<()> {
        self.update(Channel::Green, values)
    }

    pub fn update_blue(&mut self, values: impl Into<Signal>) -> Result<()> {
        self.update(Channel::Blue, values)
    }

    pub fn update_white(&mut self, values: impl Into<Signal>) -> Result<()> {
        self.update(Channel::White, values)
    }

    pub fn update_rgb(
        &mut self,
        red: impl Into<Signal>,
        green: impl Into<Signal>,
        blue: impl Into<Signal>,
    ) -> Result<()> {
        self.update_channels(vec![
            (Channel::Red, red.into()),
            (Channel::Green, green.into()),
            (Channel::Blue, blue.into()),
        ])
    }

    pub fn update_rgbw(
        &mut self,
        red: impl Into<Signal>,
        green: impl Into<Signal>,
        blue: impl Into<Signal>,
        white: impl Into<Signal>,
    ) -> Result<()> {
        self.update_channels(vec![
            (Channel::Red, red.into()),
            (Channel::Green, green.into()),
            (Channel::Blue, blue.into()),
            (Channel::White, white.into()),
        ])
    }

    /// Write `values` to the listed fixtures only; the rest of the channel
    /// keeps its current values. Counts as an update of the channel.
    pub fn update_channel_at(
        &mut self,
        channel: Channel,
        fixtures: &[FixtureId],
        values: impl Into<Signal>,
    ) -> Result<()> {
        let positions = fixtures
            .iter()
            .map(|id| self.position_of(*id))
            .collect::<Result<Vec<usize>>>()?;
        let values = match values.into() {
            Signal::Scalar(v) => vec![v; positions.len()],
            Signal::Array(values) if values.len() == positions.len() => values,
            other => {
                return Err(Error::shape(
                    format!("{} values for {} fixtures", channel, positions.len()),
                    other.describe(),
                ))
            }
        };

        let mut next = self.current(channel).to_vec();
        for (position, value) in positions.into_iter().zip(values) {
            next[position] = value;
        }
        self.channels[channel.index()].install(next);
        Ok(())
    }

    pub fn current(&self, channel: Channel) -> &[f64] {
        &self.channels[channel.index()].current
    }

    pub fn previous(&self, channel: Channel) -> &[f64] {
        &self.channels[channel.index()].previous
    }

    pub fn intensities(&self) -> &[f64] {
        self.current(Channel::Intensity)
    }

    pub fn rgb(&self) -> (&[f64], &[f64], &[f64]) {
        (
            self.current(Channel::Red),
            self.current(Channel::Green),
            self.current(Channel::Blue),
        )
    }

    pub fn rgbw(&self) -> (&[f64], &[f64], &[f64], &[f64]) {
        (
            self.current(Channel::Red),
            self.current(Channel::Green),
            self.current(Channel::Blue),
            self.current(Channel::White),
        )
    }

    pub fn previous_intensities(&self) -> &[f64] {
        self.previous(Channel::Intensity)
    }

    pub fn previous_rgb(&self) -> (&[f64], &[f64], &[f64]) {
        (
            self.previous(Channel::Red),
            self.previous(Channel::Green),
            self.previous(Channel::Blue),
        )
    }

    pub fn previous_rgbw(&self) -> (&[f64], &[f64], &[f64], &[f64]) {
        (
            self.previous(Channel::Red),
            self.previous(Channel::Green),
            self.previous(Channel::Blue),
            self.previous(Channel::White),
        )
    }

    /// Copy of every current channel.
    pub fn frame(&self) -> FixtureFrame {
        FixtureFrame {
            fixtures: self.fixtures.clone(),
            intensity: self.intensities().to_vec(),
            red: self.current(Channel::Red).to_vec(),
            green: self.current(Channel::Green).to_vec(),
            blue: self.current(Channel::Blue).to_vec(),
            white: self.current(Channel::White).to_vec(),
        }
    }
}

/// Point-in-time snapshot handed to protocol adapters, one value per
/// fixture in each channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureFrame {
    pub fixtures: Vec<FixtureId>,
    pub intensity: Vec<f64>,
    pub red: Vec<f64>,
    pub green: Vec<f64>,
    pub blue: Vec<f64>,
    pub white: Vec<f64>,
}
