//! Values flowing through transform, expansion and trigger chains

use anyhow::{bail, Result};

/// One value produced or consumed by a chain step.
///
/// `Channels` holds several arrays side by side: the per-channel output of an
/// expansion (red, green, blue, ...) or a function with multiple results.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Scalar(f64),
    Array(Vec<f64>),
    Channels(Vec<Vec<f64>>),
    Flag(bool),
}

impl Signal {
    /// Short description used in shape errors, e.g. `array[12]`.
    pub fn describe(&self) -> String {
        match self {
            Signal::Scalar(_) => "scalar".to_string(),
            Signal::Array(values) => format!("array[{}]", values.len()),
            Signal::Channels(channels) => {
                let lens: Vec<String> = channels.iter().map(|c| c.len().to_string()).collect();
                format!("{} channels [{}]", channels.len(), lens.join(", "))
            }
            Signal::Flag(_) => "flag".to_string(),
        }
    }

    /// Every numeric value, flattened. Flags contribute nothing.
    pub fn values(&self) -> Vec<f64> {
        match self {
            Signal::Scalar(v) => vec![*v],
            Signal::Array(values) => values.clone(),
            Signal::Channels(channels) => channels.iter().flatten().copied().collect(),
            Signal::Flag(_) => Vec::new(),
        }
    }

    /// A scalar, or an array holding exactly one value.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Signal::Scalar(v) => Some(*v),
            Signal::Array(values) if values.len() == 1 => Some(values[0]),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            Signal::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_channels(&self) -> Option<&[Vec<f64>]> {
        match self {
            Signal::Channels(channels) => Some(channels),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Signal::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Apply `f` to every numeric value, keeping the shape.
    pub fn map(self, f: impl Fn(f64) -> f64) -> Result<Signal> {
        Ok(match self {
            Signal::Scalar(v) => Signal::Scalar(f(v)),
            Signal::Array(values) => Signal::Array(values.into_iter().map(&f).collect()),
            Signal::Channels(channels) => Signal::Channels(
                channels
                    .into_iter()
                    .map(|c| c.into_iter().map(&f).collect())
                    .collect(),
            ),
            Signal::Flag(_) => bail!("cannot apply a numeric function to a flag"),
        })
    }

    /// Apply an array operation to the array, or to each channel. A scalar is
    /// treated as a one-element array and collapses back if the result still
    /// has one element.
    pub fn map_arrays(self, f: impl Fn(Vec<f64>) -> Result<Vec<f64>>) -> Result<Signal> {
        match self {
            Signal::Scalar(v) => {
                let out = f(vec![v])?;
                Ok(if out.len() == 1 {
                    Signal::Scalar(out[0])
                } else {
                    Signal::Array(out)
                })
            }
            Signal::Array(values) => Ok(Signal::Array(f(values)?)),
            Signal::Channels(channels) => Ok(Signal::Channels(
                channels.into_iter().map(&f).collect::<Result<_>>()?,
            )),
            Signal::Flag(_) => bail!("cannot apply an array function to a flag"),
        }
    }

    /// Reduce the array, or each channel, to one value.
    ///
    /// Channels reduce to an array with one value per channel.
    pub fn reduce(self, f: impl Fn(&[f64]) -> Result<f64>) -> Result<Signal> {
        match self {
            Signal::Scalar(v) => Ok(Signal::Scalar(f(&[v])?)),
            Signal::Array(values) => Ok(Signal::Scalar(f(&values)?)),
            Signal::Channels(channels) => Ok(Signal::Array(
                channels.iter().map(|c| f(c.as_slice())).collect::<Result<_>>()?,
            )),
            Signal::Flag(_) => bail!("cannot reduce a flag"),
        }
    }

    /// Narrow a multi-valued result to one of its members.
    ///
    /// Only `Channels` are narrowed; other shapes pass through unchanged.
    pub fn select(self, index: usize) -> Result<Signal> {
        match self {
            Signal::Channels(mut channels) => {
                if index >= channels.len() {
                    bail!(
                        "output index {} out of range for {} outputs",
                        index,
                        channels.len()
                    );
                }
                Ok(Signal::Array(channels.swap_remove(index)))
            }
            other => Ok(other),
        }
    }

    /// Replace NaN with 0, +inf with 1 and -inf with -1.
    pub fn sanitized(self) -> Signal {
        match self {
            Signal::Scalar(v) => Signal::Scalar(sanitize(v)),
            Signal::Array(values) => Signal::Array(values.into_iter().map(sanitize).collect()),
            Signal::Channels(channels) => Signal::Channels(
                channels
                    .into_iter()
                    .map(|c| c.into_iter().map(sanitize).collect())
                    .collect(),
            ),
            flag @ Signal::Flag(_) => flag,
        }
    }
}

pub(crate) fn sanitize(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else if v == f64::INFINITY {
        1.0
    } else if v == f64::NEG_INFINITY {
        -1.0
    } else {
        v
    }
}

impl From<f64> for Signal {
    fn from(v: f64) -> Self {
        Signal::Scalar(v)
    }
}

impl From<Vec<f64>> for Signal {
    fn from(values: Vec<f64>) -> Self {
        Signal::Array(values)
    }
}

impl From<&[f64]> for Signal {
    fn from(values: &[f64]) -> Self {
        Signal::Array(values.to_vec())
    }
}

impl From<Vec<Vec<f64>>> for Signal {
    fn from(channels: Vec<Vec<f64>>) -> Self {
        Signal::Channels(channels)
    }
}

impl From<bool> for Signal {
    fn from(flag: bool) -> Self {
        Signal::Flag(flag)
    }
}
