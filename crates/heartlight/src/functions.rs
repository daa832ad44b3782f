//! Library of chain steps
//!
//! Every function here returns a [`Step`]; parameters are attached as named
//! params so they can be literals or [`Statistic`]s of the chain input, e.g.
//! `range_scaler(0.0, 1.0).with_param("old_min", Statistic::Min)`.
//!
//! Element-wise functions keep the input shape. Array functions apply to an
//! array or to each channel independently. Reductions turn an array into a
//! scalar (and channels into one value per channel).

use anyhow::{anyhow, bail, Result};

use crate::chain::{Statistic, Step};

pub fn identity() -> Step {
    Step::new("identity", |signal, _| Ok(signal))
}

pub fn sine() -> Step {
    Step::new("sine", |signal, _| signal.map(f64::sin))
}

pub fn cosine() -> Step {
    Step::new("cosine", |signal, _| signal.map(f64::cos))
}

pub fn square() -> Step {
    Step::new("square", |signal, _| signal.map(|v| v * v))
}

pub fn offset(by: impl Into<Statistic>) -> Step {
    Step::new("offset", |signal, params| {
        let by = params.require("offset", 0)?;
        signal.map(|v| v + by)
    })
    .with_param("offset", by)
}

pub fn scale(by: impl Into<Statistic>) -> Step {
    Step::new("scale", |signal, params| {
        let by = params.require("scale", 0)?;
        signal.map(|v| v * by)
    })
    .with_param("scale", by)
}

/// Linear rescale into `new_min..=new_max`.
///
/// The source range comes from the `old_min` / `old_max` params when set,
/// otherwise from each array's own extremes. A flat source range maps every
/// value to `new_min`.
pub fn range_scaler(new_min: impl Into<Statistic>, new_max: impl Into<Statistic>) -> Step {
    Step::new("range_scaler", |signal, params| {
        let new_min = params.require("new_min", 0)?;
        let new_max = params.require("new_max", 1)?;
        let old_min = params.get_or_arg("old_min", 2);
        let old_max = params.get_or_arg("old_max", 3);

        signal.map_arrays(|values| {
            let lo = old_min.unwrap_or_else(|| values.iter().copied().fold(f64::INFINITY, f64::min));
            let hi = old_max.unwrap_or_else(|| values.iter().copied().fold(f64::NEG_INFINITY, f64::max));
            if hi == lo {
                return Ok(vec![new_min; values.len()]);
            }
            Ok(values
                .into_iter()
                .map(|v| (v - lo) * (new_max - new_min) / (hi - lo) + new_min)
                .collect())
        })
    })
    .with_param("new_min", new_min)
    .with_param("new_max", new_max)
}

pub fn zeros() -> Step {
    Step::new("zeros", |signal, _| signal.map(|_| 0.0))
}

pub fn ones() -> Step {
    Step::new("ones", |signal, _| signal.map(|_| 1.0))
}

/// Reverse the order of each array.
pub fn flip() -> Step {
    Step::new("flip", |signal, _| {
        signal.map_arrays(|mut values| {
            values.reverse();
            Ok(values)
        })
    })
}

pub fn negate() -> Step {
    Step::new("negate", |signal, _| signal.map(|v| -v))
}

/// Mirror values around the centre of `min..=max`.
pub fn flip_range(min: impl Into<Statistic>, max: impl Into<Statistic>) -> Step {
    Step::new("flip_range", |signal, params| {
        let min = params.require("min", 0)?;
        let max = params.require("max", 1)?;
        signal.map(|v| min + max - v)
    })
    .with_param("min", min)
    .with_param("max", max)
}

pub fn clip(min: impl Into<Statistic>, max: impl Into<Statistic>) -> Step {
    Step::new("clip", |signal, params| {
        let min = params.require("min", 0)?;
        let max = params.require("max", 1)?;
        if min > max {
            bail!("clip bounds reversed: {} > {}", min, max);
        }
        signal.map(|v| v.clamp(min, max))
    })
    .with_param("min", min)
    .with_param("max", max)
}

fn non_empty(values: &[f64]) -> Result<&[f64]> {
    if values.is_empty() {
        Err(anyhow!("cannot reduce an empty array"))
    } else {
        Ok(values)
    }
}

pub fn mean() -> Step {
    Step::new("mean", |signal, _| {
        signal.reduce(|values| {
            let values = non_empty(values)?;
            Ok(values.iter().sum::<f64>() / values.len() as f64)
        })
    })
}

pub fn median() -> Step {
    Step::new("median", |signal, _| {
        signal.reduce(|values| {
            let mut sorted = non_empty(values)?.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            Ok(if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            })
        })
    })
}

/// Population standard deviation.
pub fn std_dev() -> Step {
    Step::new("std_dev", |signal, _| {
        signal.reduce(|values| {
            let values = non_empty(values)?;
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            Ok((values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt())
        })
    })
}

/// Centred moving average with a box window, same length as the input.
/// Samples beyond either end count as zero.
pub fn moving_average(window: usize) -> Step {
    Step::new("moving_average", move |signal, _| {
        if window == 0 {
            bail!("moving average window must be at least 1");
        }
        signal.map_arrays(|values| Ok(box_average(&values, window)))
    })
}

fn box_average(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let shift = (window - 1) / 2;
    (0..n)
        .map(|i| {
            // Index into the full convolution
            let m = i + shift;
            let start = (m + 1).saturating_sub(window);
            let end = m.min(n.saturating_sub(1));
            let sum: f64 = if start <= end { values[start..=end].iter().sum() } else { 0.0 };
            sum / window as f64
        })
        .collect()
}

/// Differences between consecutive samples (one shorter than the input).
pub fn diff() -> Step {
    Step::new("diff", |signal, _| {
        signal.map_arrays(|values| Ok(values.windows(2).map(|w| w[1] - w[0]).collect()))
    })
}

/// Indices of local maxima at or above the `height` param.
///
/// Peaks closer than the `distance` param (in samples) are thinned, keeping
/// the taller one. Defaults: height 0, distance 1.
pub fn peaks() -> Step {
    Step::new("peaks", |signal, params| {
        let height = params.get_or_arg("height", 0).unwrap_or(0.0);
        let distance = params.get_or_arg("distance", 1).unwrap_or(1.0).max(1.0) as usize;
        signal.map_arrays(|values| {
            Ok(find_peaks(&values, height, distance)
                .into_iter()
                .map(|i| i as f64)
                .collect())
        })
    })
}

fn find_peaks(values: &[f64], height: f64, distance: usize) -> Vec<usize> {
    let mut candidates: Vec<usize> = Vec::new();
    let mut i = 1;
    while i + 1 < values.len() {
        if values[i] > values[i - 1] {
            // Walk across a plateau and take its middle
            let mut ahead = i + 1;
            while ahead + 1 < values.len() && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                let peak = (i + ahead - 1) / 2;
                if values[peak] >= height {
                    candidates.push(peak);
                }
                i = ahead;
                continue;
            }
        }
        i += 1;
    }

    if distance <= 1 || candidates.len() < 2 {
        return candidates;
    }

    let mut by_height = candidates.clone();
    by_height.sort_by(|a, b| values[*b].total_cmp(&values[*a]));
    let mut kept: Vec<usize> = Vec::new();
    for candidate in by_height {
        if kept.iter().all(|k| k.abs_diff(candidate) >= distance) {
            kept.push(candidate);
        }
    }
    kept.sort_unstable();
    kept
}

/// Beats per minute from peak indices sampled at `sample_rate`.
///
/// Takes the median of the instantaneous rates between consecutive peaks;
/// fewer than two peaks give zero.
pub fn bpm(sample_rate: f64) -> Step {
    Step::new("bpm", move |signal, _| {
        if sample_rate <= 0.0 {
            bail!("sample rate must be positive");
        }
        signal.reduce(|indices| {
            let mut rates: Vec<f64> = indices
                .windows(2)
                .map(|w| w[1] - w[0])
                .filter(|rr| *rr > 0.0)
                .map(|rr| 60.0 * sample_rate / rr)
                .collect();
            if rates.is_empty() {
                return Ok(0.0);
            }
            rates.sort_by(f64::total_cmp);
            let mid = rates.len() / 2;
            Ok(if rates.len() % 2 == 0 {
                (rates[mid - 1] + rates[mid]) / 2.0
            } else {
                rates[mid]
            })
        })
    })
}
