//! Continuous mapping into fixture state
//!
//! Takes the aggregation working array (or one of its cached expansions),
//! runs the mapping chain over it and writes the result into the fixture
//! channels named by a [`Parameter`].

use tracing::debug;

use crate::aggregation::AggregationArray;
use crate::chain::Chain;
use crate::error::{Error, Result};
use crate::fixtures::{Channel, FixtureState, Parameter};
use crate::shared::{self, Shared};
use crate::signal::Signal;

pub struct ContinuousDispatcher {
    aggregation: Shared<AggregationArray>,
    fixtures: Shared<FixtureState>,
    chain: Chain,
}

impl ContinuousDispatcher {
    pub fn new(
        aggregation: Shared<AggregationArray>,
        fixtures: Shared<FixtureState>,
        chain: Chain,
    ) -> Self {
        Self {
            aggregation,
            fixtures,
            chain,
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Swap the mapping chain; takes effect on the next `apply`.
    pub fn set_chain(&mut self, chain: Chain) {
        debug!(steps = chain.len(), "mapping chain replaced");
        self.chain = chain;
    }

    /// Map the working array (or the cached expansion `expansion`) into the
    /// fixture channels of `parameter`.
    ///
    /// Single-channel parameters need one array with a value per fixture;
    /// `Rgb` / `Rgbw` need three / four such arrays. The shape is checked
    /// before the fixture state is touched.
    pub fn apply(&self, parameter: Parameter, expansion: Option<&str>) -> Result<()> {
        let updates = self
            .evaluate(parameter, expansion)?
            .into_iter()
            .map(|(channel, values)| (channel, Signal::Array(values)))
            .collect();
        shared::write(&self.fixtures).update_channels(updates)?;
        debug!(?parameter, expansion = expansion.unwrap_or("<array>"), "mapping applied");
        Ok(())
    }

    /// Run the mapping and return the per-channel targets without writing
    /// them, for callers that commit through a [`Ramp`](crate::actions::Ramp).
    pub fn evaluate(
        &self,
        parameter: Parameter,
        expansion: Option<&str>,
    ) -> Result<Vec<(Channel, Vec<f64>)>> {
        let source = {
            let aggregation = shared::read(&self.aggregation);
            match expansion {
                Some(name) => aggregation.get_expansion(name)?.clone(),
                None => Signal::Array(aggregation.values().to_vec()),
            }
        };

        let output = self.chain.run(source)?;
        let fixture_count = shared::read(&self.fixtures).len();
        let channels = parameter.channels();
        let arrays = split_output(output, channels.len(), fixture_count)?;
        Ok(channels.iter().copied().zip(arrays).collect())
    }
}

fn split_output(output: Signal, arity: usize, fixture_count: usize) -> Result<Vec<Vec<f64>>> {
    let expected = || {
        if arity == 1 {
            format!("one array of length {fixture_count}")
        } else {
            format!("{arity} arrays of length {fixture_count}")
        }
    };

    match output {
        Signal::Array(values) if arity == 1 && values.len() == fixture_count => Ok(vec![values]),
        Signal::Channels(channels)
            if channels.len() == arity && channels.iter().all(|c| c.len() == fixture_count) =>
        {
            Ok(channels)
        }
        other => Err(Error::shape(expected(), other.describe())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Step;
    use crate::expansion::{expand_channels, interpolate_step, EdgeMode};
    use crate::functions;
    use crate::registry::BufferRegistry;
    use crate::shared::shared;
    use pretty_assertions::assert_eq;

    struct Rig {
        registry: BufferRegistry,
        aggregation: Shared<AggregationArray>,
        fixtures: Shared<FixtureState>,
    }

    fn rig() -> Rig {
        let registry = BufferRegistry::with_keys(["/a", "/b"], 4);
        let aggregation = shared(AggregationArray::from_registry(&registry));
        let fixtures = shared(FixtureState::new(vec![1, 2, 3], &[1, 3]).unwrap());
        Rig {
            registry,
            aggregation,
            fixtures,
        }
    }

    fn spread_to_fixtures(rig: &Rig) {
        rig.registry.ingest("/a", &[0.0]).unwrap();
        rig.registry.ingest("/b", &[1.0]).unwrap();
        let mut aggregation = shared::write(&rig.aggregation);
        aggregation.update(&Chain::new().then(functions::mean())).unwrap();
        aggregation
            .spatial_expansion(
                &Chain::new().then(interpolate_step(3, vec![0, 2], EdgeMode::Reflect)),
                Some("spread"),
                false,
            )
            .unwrap();
    }

    #[test]
    fn test_apply_single_channel_from_expansion() {
        let rig = rig();
        spread_to_fixtures(&rig);
        let dispatcher = ContinuousDispatcher::new(
            rig.aggregation.clone(),
            rig.fixtures.clone(),
            Chain::new().then(functions::scale(10.0)),
        );

        dispatcher.apply(Parameter::Intensity, Some("spread")).unwrap();
        assert_eq!(
            shared::read(&rig.fixtures).intensities(),
            &[0.0, 5.0, 10.0]
        );
    }

    #[test]
    fn test_evaluate_leaves_fixtures_untouched() {
        let rig = rig();
        spread_to_fixtures(&rig);
        shared::write(&rig.fixtures).update_intensity(7.0).unwrap();
        let dispatcher = ContinuousDispatcher::new(
            rig.aggregation.clone(),
            rig.fixtures.clone(),
            Chain::new().then(functions::scale(10.0)),
        );

        let targets = dispatcher.evaluate(Parameter::Intensity, Some("spread")).unwrap();
        assert_eq!(targets, vec![(Channel::Intensity, vec![0.0, 5.0, 10.0])]);

        let fixtures = shared::read(&rig.fixtures);
        assert_eq!(fixtures.intensities(), &[7.0, 7.0, 7.0]);
        assert_eq!(fixtures.previous(Channel::Intensity), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_apply_rgb_with_two_arrays_fails_without_mutation() {
        let rig = rig();
        spread_to_fixtures(&rig);
        let two_channels = Chain::new().then(expand_channels(vec![Chain::new(), Chain::new()]));
        let dispatcher =
            ContinuousDispatcher::new(rig.aggregation.clone(), rig.fixtures.clone(), two_channels);

        let err = dispatcher.apply(Parameter::Rgb, Some("spread")).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        let fixtures = shared::read(&rig.fixtures);
        for channel in Channel::ALL {
            assert_eq!(fixtures.current(channel), &[0.0, 0.0, 0.0]);
            assert_eq!(fixtures.previous(channel), &[0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_apply_rgb_writes_three_channels() {
        let rig = rig();
        spread_to_fixtures(&rig);
        let colours = Chain::new().then(expand_channels(vec![
            Chain::new(),
            Chain::new().then(functions::flip()),
            Chain::new().then(functions::ones()),
        ]));
        let dispatcher = ContinuousDispatcher::new(rig.aggregation.clone(), rig.fixtures.clone(), colours);

        dispatcher.apply(Parameter::Rgb, Some("spread")).unwrap();
        let fixtures = shared::read(&rig.fixtures);
        let (r, g, b) = fixtures.rgb();
        assert_eq!(r, &[0.0, 0.5, 1.0]);
        assert_eq!(g, &[1.0, 0.5, 0.0]);
        assert_eq!(b, &[1.0, 1.0, 1.0]);
        assert_eq!(fixtures.current(Channel::White), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_apply_working_array_length_mismatch() {
        let rig = rig();
        // two keys, three fixtures
        let dispatcher =
            ContinuousDispatcher::new(rig.aggregation.clone(), rig.fixtures.clone(), Chain::new());
        assert!(matches!(
            dispatcher.apply(Parameter::Red, None),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_apply_unknown_expansion() {
        let rig = rig();
        let dispatcher =
            ContinuousDispatcher::new(rig.aggregation.clone(), rig.fixtures.clone(), Chain::new());
        assert!(matches!(
            dispatcher.apply(Parameter::Red, Some("nope")),
            Err(Error::UnknownExpansion(_))
        ));
    }

    #[test]
    fn test_set_chain_switches_mapping() {
        let rig = rig();
        spread_to_fixtures(&rig);
        let mut dispatcher =
            ContinuousDispatcher::new(rig.aggregation.clone(), rig.fixtures.clone(), Chain::new());

        dispatcher.apply(Parameter::Green, Some("spread")).unwrap();
        dispatcher.set_chain(Chain::new().then(Step::new("halve", |s, _| s.map(|v| v / 2.0))));
        dispatcher.apply(Parameter::Green, Some("spread")).unwrap();

        let fixtures = shared::read(&rig.fixtures);
        assert_eq!(fixtures.previous(Channel::Green), &[0.0, 0.5, 1.0]);
        assert_eq!(fixtures.current(Channel::Green), &[0.0, 0.25, 0.5]);
    }
}
