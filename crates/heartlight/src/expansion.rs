//! Spatial expansion
//!
//! Projects a handful of aggregated values onto a larger structure, usually
//! one value per fixture. `interpolate` places each input value at an anchor
//! index and fills the gaps linearly; what happens beyond the outermost
//! anchors depends on the [`EdgeMode`].

use std::fmt;
use std::str::FromStr;

use anyhow::bail;

use crate::chain::{Chain, Step};
use crate::error::{Error, Result};
use crate::signal::Signal;

/// Behaviour outside the outermost anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeMode {
    /// Continue the slope between the two outer anchors back on itself, so
    /// values fade towards the neighbouring anchor's value.
    #[default]
    Reflect,
    /// Treat the output as circular and interpolate from the last anchor
    /// round to the first.
    Wrap,
}

impl FromStr for EdgeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reflect" => Ok(EdgeMode::Reflect),
            "wrap" => Ok(EdgeMode::Wrap),
            _ => Err(Error::InvalidEdgeMode(s.to_string())),
        }
    }
}

impl fmt::Display for EdgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeMode::Reflect => write!(f, "reflect"),
            EdgeMode::Wrap => write!(f, "wrap"),
        }
    }
}

/// Interpolate `values`, placed at `anchors`, across `output_size` slots.
///
/// Anchors must be strictly increasing and below `output_size`, one per
/// input value. A single anchor yields a constant array in either mode.
pub fn interpolate(
    values: &[f64],
    output_size: usize,
    anchors: &[usize],
    mode: EdgeMode,
) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(Error::shape("at least one anchor value", "array[0]"));
    }
    if anchors.len() != values.len() {
        return Err(Error::shape(
            format!("{} anchor indices", values.len()),
            format!("{}", anchors.len()),
        ));
    }
    if output_size < values.len() {
        return Err(Error::shape(
            format!("output size >= {}", values.len()),
            output_size.to_string(),
        ));
    }
    for (i, &anchor) in anchors.iter().enumerate() {
        if anchor >= output_size {
            return Err(Error::PositionConflict(format!(
                "anchor {anchor} out of range for {output_size} outputs"
            )));
        }
        if i > 0 && anchor <= anchors[i - 1] {
            return Err(Error::PositionConflict(format!(
                "anchors must be strictly increasing ({} then {anchor})",
                anchors[i - 1]
            )));
        }
    }

    if values.len() == 1 {
        return Ok(vec![values[0]; output_size]);
    }

    Ok(match mode {
        EdgeMode::Reflect => interpolate_reflect(values, output_size, anchors),
        EdgeMode::Wrap => interpolate_wrap(values, output_size, anchors),
    })
}

fn lerp(start: f64, end: f64, weight: f64) -> f64 {
    start + weight * (end - start)
}

fn fill_between(out: &mut [f64], values: &[f64], anchors: &[usize]) {
    for (pair, span) in anchors.windows(2).zip(values.windows(2)) {
        let (from, to) = (pair[0], pair[1]);
        for idx in from + 1..to {
            let weight = (idx - from) as f64 / (to - from) as f64;
            out[idx] = lerp(span[0], span[1], weight);
        }
    }
}

fn interpolate_reflect(values: &[f64], n: usize, anchors: &[usize]) -> Vec<f64> {
    let mut out = vec![0.0; n];
    for (&anchor, &value) in anchors.iter().zip(values) {
        out[anchor] = value;
    }
    fill_between(&mut out, values, anchors);

    let last = values.len() - 1;
    let first_anchor = anchors[0];
    let last_anchor = anchors[last];

    // Left of the first anchor: ramp from values[1] towards values[0]
    for (j, slot) in out.iter_mut().enumerate().take(first_anchor) {
        let weight = (j + 1) as f64 / (first_anchor + 1) as f64;
        *slot = lerp(values[1], values[0], weight);
    }
    // Right of the last anchor: ramp from values[last] back towards values[last - 1]
    for (j, slot) in out.iter_mut().enumerate().skip(last_anchor + 1) {
        let weight = (j - last_anchor) as f64 / (n - last_anchor) as f64;
        *slot = lerp(values[last], values[last - 1], weight);
    }
    out
}

fn interpolate_wrap(values: &[f64], n: usize, anchors: &[usize]) -> Vec<f64> {
    let mut out = vec![0.0; n];
    for (&anchor, &value) in anchors.iter().zip(values) {
        out[anchor] = value;
    }
    fill_between(&mut out, values, anchors);

    let last = values.len() - 1;
    let from = anchors[last];
    let to = anchors[0] + n;
    for idx in from + 1..to {
        let weight = (idx - from) as f64 / (to - from) as f64;
        out[idx % n] = lerp(values[last], values[0], weight);
    }
    out
}

/// Constant array of `output_size` copies of `value`.
pub fn fill(output_size: usize, value: f64) -> Vec<f64> {
    vec![value; output_size]
}

/// Chain step interpolating the incoming array (or each channel).
pub fn interpolate_step(output_size: usize, anchors: Vec<usize>, mode: EdgeMode) -> Step {
    Step::new("interpolate", move |signal, _| {
        signal.map_arrays(|values| Ok(interpolate(&values, output_size, &anchors, mode)?))
    })
}

/// Chain step producing a constant array regardless of its input.
///
/// The fill value may be given as the named parameter `value` (including a
/// statistic of the chain input) or as the first positional argument.
pub fn fill_step(output_size: usize) -> Step {
    Step::new("fill", move |_, params| {
        let value = params.require("value", 0)?;
        Ok(Signal::Array(fill(output_size, value)))
    })
}

/// Chain step running one sub-chain per output channel over the same input,
/// e.g. red, green and blue curves derived from a single expansion.
pub fn expand_channels(channels: Vec<Chain>) -> Step {
    Step::new("expand_channels", move |signal, _| {
        let mut outputs = Vec::with_capacity(channels.len());
        for (i, chain) in channels.iter().enumerate() {
            let output = match chain.run(signal.clone())? {
                Signal::Array(values) => values,
                Signal::Scalar(value) => vec![value],
                other => bail!("channel {} produced {}", i, other.describe()),
            };
            outputs.push(output);
        }
        Ok(Signal::Channels(outputs))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_edge_mode_from_str() {
        assert_eq!("reflect".parse::<EdgeMode>().unwrap(), EdgeMode::Reflect);
        assert_eq!("Wrap".parse::<EdgeMode>().unwrap(), EdgeMode::Wrap);
        assert!(matches!(
            "mirror".parse::<EdgeMode>(),
            Err(Error::InvalidEdgeMode(m)) if m == "mirror"
        ));
    }

    #[test]
    fn test_interpolate_between_anchors() {
        let out = interpolate(&[0.0, 10.0], 5, &[0, 4], EdgeMode::Reflect).unwrap();
        assert_eq!(out, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn test_reflect_edges() {
        let out = interpolate(&[0.0, 10.0], 5, &[1, 3], EdgeMode::Reflect).unwrap();
        assert_eq!(out, vec![5.0, 0.0, 5.0, 10.0, 5.0]);
    }

    #[test]
    fn test_wrap_edges() {
        let out = interpolate(&[0.0, 10.0], 4, &[0, 2], EdgeMode::Wrap).unwrap();
        assert_eq!(out, vec![0.0, 5.0, 10.0, 5.0]);

        let out = interpolate(&[0.0, 8.0], 6, &[1, 3], EdgeMode::Wrap).unwrap();
        // 3 -> 7 (== 1 + 6) spans four steps: 6, 4, 2 at 4, 5, 0
        assert_eq!(out, vec![2.0, 0.0, 4.0, 8.0, 6.0, 4.0]);
    }

    #[test]
    fn test_single_anchor_is_constant() {
        for mode in [EdgeMode::Wrap, EdgeMode::Reflect] {
            let out = interpolate(&[0.7], 5, &[3], mode).unwrap();
            assert_eq!(out, vec![0.7; 5]);
        }
    }

    #[test]
    fn test_interpolate_validation() {
        assert!(matches!(
            interpolate(&[1.0, 2.0], 1, &[0, 1], EdgeMode::Wrap),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            interpolate(&[1.0, 2.0], 4, &[0], EdgeMode::Wrap),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            interpolate(&[1.0, 2.0], 4, &[2, 1], EdgeMode::Wrap),
            Err(Error::PositionConflict(_))
        ));
        assert!(matches!(
            interpolate(&[1.0, 2.0], 4, &[0, 4], EdgeMode::Wrap),
            Err(Error::PositionConflict(_))
        ));
    }

    #[test]
    fn test_fill_step_uses_param() {
        let chain = Chain::new().then(fill_step(3).with_arg(0.5));
        assert_eq!(
            chain.run(Signal::Array(vec![9.0])).unwrap(),
            Signal::Array(vec![0.5; 3])
        );
    }

    #[test]
    fn test_expand_channels_runs_each_chain() {
        let negate = Chain::new().then(Step::new("negate", |s, _| s.map(|v| -v)));
        let step = expand_channels(vec![Chain::new(), negate]);
        let out = Chain::new()
            .then(step)
            .run(Signal::Array(vec![1.0, 2.0]))
            .unwrap();
        assert_eq!(
            out,
            Signal::Channels(vec![vec![1.0, 2.0], vec![-1.0, -2.0]])
        );
    }

    #[test]
    fn test_interpolate_step_over_channels() {
        let chain = Chain::new().then(interpolate_step(3, vec![0, 2], EdgeMode::Reflect));
        let out = chain
            .run(Signal::Channels(vec![vec![0.0, 2.0], vec![4.0, 0.0]]))
            .unwrap();
        assert_eq!(
            out,
            Signal::Channels(vec![vec![0.0, 1.0, 2.0], vec![4.0, 2.0, 0.0]])
        );
    }
}
