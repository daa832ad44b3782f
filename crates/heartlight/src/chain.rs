//! Transform chains
//!
//! A chain is an ordered list of steps. Each step wraps a function with the
//! uniform signature `(Signal, &Params) -> anyhow::Result<Signal>`; the output
//! of one step is the input of the next.
//!
//! Named parameters may be a [`Statistic`] instead of a literal. These are
//! resolved against the value entering each step just before it is called,
//! so `range_scaler(old_min = Min, old_max = Max)` rescales against whatever
//! the previous step produced.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;

use crate::error::{Error, Result};
use crate::signal::Signal;

/// A named parameter value: a literal, or a statistic of the chain input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic {
    Min,
    Max,
    Mean,
    Std,
    Median,
    Literal(f64),
}

impl Statistic {
    fn label(&self) -> &'static str {
        match self {
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Mean => "mean",
            Statistic::Std => "std",
            Statistic::Median => "median",
            Statistic::Literal(_) => "literal",
        }
    }
}

impl From<f64> for Statistic {
    fn from(v: f64) -> Self {
        Statistic::Literal(v)
    }
}

/// Summary statistics over the finite values of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub median: f64,
}

impl Stats {
    /// Returns `None` when there are no finite values.
    pub fn of(values: &[f64]) -> Option<Stats> {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        finite.sort_by(f64::total_cmp);

        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let mid = finite.len() / 2;
        let median = if finite.len() % 2 == 0 {
            (finite[mid - 1] + finite[mid]) / 2.0
        } else {
            finite[mid]
        };

        Some(Stats {
            min: finite[0],
            max: finite[finite.len() - 1],
            mean,
            std: variance.sqrt(),
            median,
        })
    }

    fn get(&self, statistic: Statistic) -> f64 {
        match statistic {
            Statistic::Min => self.min,
            Statistic::Max => self.max,
            Statistic::Mean => self.mean,
            Statistic::Std => self.std,
            Statistic::Median => self.median,
            Statistic::Literal(v) => v,
        }
    }
}

/// Resolved arguments handed to a step function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    positional: Vec<f64>,
    named: BTreeMap<String, f64>,
}

impl Params {
    pub fn positional(&self) -> &[f64] {
        &self.positional
    }

    pub fn arg(&self, index: usize) -> Option<f64> {
        self.positional.get(index).copied()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.named.get(name).copied()
    }

    /// Named value, falling back to a positional one.
    pub fn get_or_arg(&self, name: &str, index: usize) -> Option<f64> {
        self.get(name).or_else(|| self.arg(index))
    }

    pub fn require(&self, name: &str, index: usize) -> anyhow::Result<f64> {
        self.get_or_arg(name, index)
            .ok_or_else(|| anyhow!("missing parameter '{}'", name))
    }
}

pub type StepFn = Arc<dyn Fn(Signal, &Params) -> anyhow::Result<Signal> + Send + Sync>;

/// One function application in a chain.
#[derive(Clone)]
pub struct Step {
    name: String,
    func: StepFn,
    args: Vec<f64>,
    params: Vec<(String, Statistic)>,
    select: Option<usize>,
}

impl Step {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Signal, &Params) -> anyhow::Result<Signal> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
            args: Vec::new(),
            params: Vec::new(),
            select: None,
        }
    }

    pub fn with_arg(mut self, value: f64) -> Self {
        self.args.push(value);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Statistic>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// Keep only output `index` of a multi-valued result.
    pub fn select(mut self, index: usize) -> Self {
        self.select = Some(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn needs_stats(&self) -> bool {
        self.params
            .iter()
            .any(|(_, v)| !matches!(v, Statistic::Literal(_)))
    }

    fn resolve(&self, stats: Option<&Stats>) -> std::result::Result<Params, String> {
        let mut named = BTreeMap::new();
        for (name, value) in &self.params {
            let resolved = match (value, stats) {
                (Statistic::Literal(v), _) => *v,
                (statistic, Some(stats)) => stats.get(*statistic),
                (statistic, None) => {
                    return Err(format!(
                        "statistic '{}' for '{}' requested on an empty input",
                        statistic.label(),
                        name
                    ))
                }
            };
            named.insert(name.clone(), resolved);
        }
        Ok(Params {
            positional: self.args.clone(),
            named,
        })
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("params", &self.params)
            .field("select", &self.select)
            .finish()
    }
}

/// Ordered list of steps applied to a snapshot.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    steps: Vec<Step>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step (builder form)
    pub fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order over `input`.
    ///
    /// The input is sanitised first (NaN → 0, ±inf → ±1). [`Statistic`]
    /// parameters of a step are taken from the value entering that step.
    /// Array outputs are sanitised again before returning. An empty chain
    /// returns the sanitised input.
    pub fn run(&self, input: Signal) -> Result<Signal> {
        let mut value = input.sanitized();
        for (index, step) in self.steps.iter().enumerate() {
            let stats = if step.needs_stats() {
                Stats::of(&value.values())
            } else {
                None
            };
            let params = step.resolve(stats.as_ref()).map_err(|reason| Error::InvalidChain {
                index,
                step: step.name.clone(),
                reason,
            })?;

            value = (step.func)(value, &params).map_err(|e| Error::InvalidChain {
                index,
                step: step.name.clone(),
                reason: format!("{e:#}"),
            })?;

            if let Some(output) = step.select {
                value = value.select(output).map_err(|e| Error::InvalidChain {
                    index,
                    step: step.name.clone(),
                    reason: e.to_string(),
                })?;
            }
        }

        Ok(value.sanitized())
    }
}

impl FromIterator<Step> for Chain {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    fn add_step(amount: f64) -> Step {
        Step::new("add", |signal, params| {
            let amount = params.require("amount", 0)?;
            signal.map(|v| v + amount)
        })
        .with_arg(amount)
    }

    #[test]
    fn test_steps_run_in_order() {
        let chain = Chain::new()
            .then(add_step(1.0))
            .then(Step::new("double", |s, _| s.map(|v| v * 2.0)));

        let out = chain.run(Signal::Array(vec![1.0, 2.0])).unwrap();
        assert_eq!(out, Signal::Array(vec![4.0, 6.0]));
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let out = Chain::new().run(Signal::Scalar(3.0)).unwrap();
        assert_eq!(out, Signal::Scalar(3.0));
    }

    #[test]
    fn test_statistic_resolves_against_input() {
        let chain = Chain::new().then(
            Step::new("subtract", |s, p| {
                let by = p.require("by", 0)?;
                s.map(|v| v - by)
            })
            .with_param("by", Statistic::Mean),
        );

        let out = chain.run(Signal::Array(vec![2.0, 4.0, 6.0])).unwrap();
        assert_eq!(out, Signal::Array(vec![-2.0, 0.0, 2.0]));
    }

    #[test]
    fn test_statistics_follow_previous_step() {
        use crate::functions::{range_scaler, scale};

        let chain = Chain::new().then(scale(10.0)).then(
            range_scaler(0.0, 1.0)
                .with_param("old_min", Statistic::Min)
                .with_param("old_max", Statistic::Max),
        );
        let out = chain.run(Signal::Array(vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(out, Signal::Array(vec![0.0, 0.5, 1.0]));
    }

    #[test]
    fn test_mean_after_offset_uses_offset_values() {
        use crate::functions::offset;

        let chain = Chain::new().then(offset(10.0)).then(
            Step::new("centre", |s, p| {
                let by = p.require("by", 0)?;
                s.map(|v| v - by)
            })
            .with_param("by", Statistic::Mean),
        );
        let out = chain.run(Signal::Array(vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(out, Signal::Array(vec![-1.0, 0.0, 1.0]));
    }

    #[test]
    fn test_statistic_after_emptying_step_fails_at_that_step() {
        let chain = Chain::new()
            .then(Step::new("drop_all", |_, _| Ok(Signal::Array(Vec::new()))))
            .then(Step::new("noop", |s, _| Ok(s)).with_param("x", Statistic::Min));

        let err = chain.run(Signal::Array(vec![1.0, 2.0])).unwrap_err();
        assert!(matches!(err, Error::InvalidChain { index: 1, .. }));
    }

    #[test]
    fn test_statistic_on_empty_input_fails() {
        let chain = Chain::new().then(Step::new("noop", |s, _| Ok(s)).with_param("x", Statistic::Max));

        let err = chain.run(Signal::Array(vec![])).unwrap_err();
        match err {
            Error::InvalidChain { index, step, reason } => {
                assert_eq!(index, 0);
                assert_eq!(step, "noop");
                assert!(reason.contains("max"));
            }
            other => panic!("expected InvalidChain, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_params_work_on_empty_input() {
        let chain = Chain::new().then(Step::new("noop", |s, _| Ok(s)).with_param("x", 1.0));
        assert!(chain.run(Signal::Array(vec![])).is_ok());
    }

    #[test]
    fn test_failing_step_reports_index_and_name() {
        let chain = Chain::new()
            .then(add_step(1.0))
            .then(Step::new("explode", |_, _| bail!("boom")));

        let err = chain.run(Signal::Scalar(0.0)).unwrap_err();
        match err {
            Error::InvalidChain { index, step, reason } => {
                assert_eq!(index, 1);
                assert_eq!(step, "explode");
                assert_eq!(reason, "boom");
            }
            other => panic!("expected InvalidChain, got {other:?}"),
        }
    }

    #[test]
    fn test_select_narrows_between_steps() {
        let chain = Chain::new()
            .then(
                Step::new("split", |s, _| {
                    let v = s.values();
                    Ok(Signal::Channels(vec![v.clone(), v.iter().map(|x| -x).collect()]))
                })
                .select(1),
            )
            .then(add_step(10.0));

        let out = chain.run(Signal::Array(vec![1.0, 2.0])).unwrap();
        assert_eq!(out, Signal::Array(vec![9.0, 8.0]));
    }

    #[test]
    fn test_input_is_sanitized_before_stats() {
        let chain = Chain::new().then(
            Step::new("max", |_, p| Ok(Signal::Scalar(p.require("m", 0)?))).with_param("m", Statistic::Max),
        );
        let out = chain.run(Signal::Array(vec![f64::NAN, 0.5, f64::INFINITY])).unwrap();
        // +inf becomes 1.0 before statistics are taken
        assert_eq!(out, Signal::Scalar(1.0));
    }

    #[test]
    fn test_stats_median_even_and_odd() {
        assert_eq!(Stats::of(&[3.0, 1.0, 2.0]).unwrap().median, 2.0);
        assert_eq!(Stats::of(&[4.0, 1.0, 2.0, 3.0]).unwrap().median, 2.5);
    }

    #[test]
    fn test_stats_population_std() {
        let stats = Stats::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std, 2.0);
    }

    #[test]
    fn test_stats_none_without_finite_values() {
        assert!(Stats::of(&[]).is_none());
        assert!(Stats::of(&[f64::NAN]).is_none());
    }

    #[test]
    fn test_with_param_replaces_existing() {
        let step = Step::new("noop", |s, _| Ok(s))
            .with_param("x", 1.0)
            .with_param("x", 2.0);
        let params = step.resolve(None).unwrap();
        assert_eq!(params.get("x"), Some(2.0));
    }
}
