//! End-to-end behaviour of the pipeline: ingestion through aggregation,
//! expansion and mapping into fixture state, plus trigger-driven actions.

use std::time::Duration;

use heartlight::expansion::{expand_channels, interpolate, interpolate_step};
use heartlight::functions::{mean, peaks, range_scaler, scale};
use heartlight::shared::{self, shared};
use heartlight::{
    AggregationArray, BufferRegistry, Chain, Channel, ContinuousDispatcher, CrossingDetector,
    EdgeMode, Error, EventDispatcher, FixtureState, Gating, Parameter, Pulse, QuerySource,
    SampleBuffer, Statistic, TriggerChain, TriggerDetector,
};
use pretty_assertions::assert_eq;

fn mean_chain() -> Chain {
    Chain::new().then(mean())
}

#[test]
fn test_buffer_keeps_most_recent_samples() {
    let registry = BufferRegistry::with_keys(["/ecg"], 4);
    registry
        .ingest_address("/ecg/raw", &[1.0, 2.0, 3.0, 4.0, 5.0])
        .unwrap();

    let buffer = registry.get("/ecg").unwrap();
    let buffer = shared::read(&buffer);
    assert_eq!(buffer.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
    assert!(buffer.is_full());
}

#[test]
fn test_mean_times_two_of_full_buffer() {
    let mut buffer = SampleBuffer::new(4);
    buffer.enqueue([1.0, 2.0, 3.0, 4.0, 5.0]);
    let out = buffer
        .transform(&Chain::new().then(mean()).then(scale(2.0)))
        .unwrap();
    assert_eq!(out.as_scalar(), Some(7.0));
}

#[test]
fn test_buffer_normalised_after_scaling() {
    let mut buffer = SampleBuffer::new(3);
    buffer.enqueue([1.0, 2.0, 3.0]);
    let normalise = Chain::new().then(scale(10.0)).then(
        range_scaler(0.0, 1.0)
            .with_param("old_min", Statistic::Min)
            .with_param("old_max", Statistic::Max),
    );
    let out = buffer.transform(&normalise).unwrap();
    assert_eq!(out.as_array(), Some(&[0.0, 0.5, 1.0][..]));
}

#[test]
fn test_update_gate_runs_once_per_change() {
    let registry = BufferRegistry::with_keys(["/a", "/b"], 8);
    let mut aggregation = AggregationArray::from_registry(&registry);

    registry.ingest("/a", &[1.0, 3.0]).unwrap();
    assert!(aggregation.update_tick(&mean_chain(), Gating::Update).unwrap());
    assert!(!aggregation.update_tick(&mean_chain(), Gating::Update).unwrap());
    assert_eq!(aggregation.values(), &[2.0, 0.0]);

    registry.ingest("/b", &[5.0]).unwrap();
    assert!(aggregation.update_tick(&mean_chain(), Gating::Update).unwrap());
    assert_eq!(aggregation.values(), &[2.0, 5.0]);
    assert_eq!(aggregation.updated_keys(), vec!["/b"]);
}

#[test]
fn test_get_values_follows_slot_order() {
    let registry = BufferRegistry::with_keys(["/aud", "/brs", "/vn1"], 4);
    registry.ingest("/aud", &[1.0]).unwrap();
    registry.ingest("/brs", &[2.0]).unwrap();
    registry.ingest("/vn1", &[3.0]).unwrap();

    let mut aggregation = AggregationArray::from_registry(&registry);
    aggregation
        .set_positions([("/aud", 2), ("/vn1", 0), ("/brs", 1)])
        .unwrap();
    aggregation.update(&mean_chain()).unwrap();

    assert_eq!(aggregation.values(), &[3.0, 2.0, 1.0]);
    assert_eq!(
        aggregation.get_values(Some(&["/aud", "/vn1"])).unwrap(),
        vec![3.0, 1.0]
    );
    assert_eq!(aggregation.positions(), vec!["/vn1", "/brs", "/aud"]);
}

#[test]
fn test_single_anchor_wrap_is_constant() {
    assert_eq!(
        interpolate(&[0.7], 6, &[2], EdgeMode::Wrap).unwrap(),
        vec![0.7; 6]
    );
}

#[test]
fn test_buffers_expand_into_fixture_intensities() {
    let registry = BufferRegistry::with_keys(["/a", "/b", "/c"], 4);
    registry.ingest("/a", &[10.0, 10.0]).unwrap();
    registry.ingest("/b", &[15.0, 25.0]).unwrap();
    registry.ingest("/c", &[30.0]).unwrap();

    let fixtures = FixtureState::new(vec![1, 2, 3, 4, 5], &[1, 3, 5]).unwrap();
    let expansion = Chain::new().then(interpolate_step(
        fixtures.len(),
        fixtures.anchor_positions().to_vec(),
        EdgeMode::Reflect,
    ));
    let fixtures = shared(fixtures);
    let aggregation = shared(AggregationArray::from_registry(&registry));
    {
        let mut aggregation = shared::write(&aggregation);
        aggregation.update(&mean_chain()).unwrap();
        aggregation
            .spatial_expansion(&expansion, Some("spread"), false)
            .unwrap();
    }

    let mapping = ContinuousDispatcher::new(aggregation, fixtures.clone(), Chain::new());
    mapping.apply(Parameter::Intensity, Some("spread")).unwrap();

    assert_eq!(
        shared::read(&fixtures).intensities(),
        &[10.0, 15.0, 20.0, 25.0, 30.0]
    );
}

#[test]
fn test_rgb_with_two_arrays_leaves_fixtures_untouched() {
    let registry = BufferRegistry::with_keys(["/a"], 4);
    registry.ingest("/a", &[0.5]).unwrap();

    let fixtures = shared(FixtureState::new(vec![1, 2], &[1]).unwrap());
    let aggregation = shared(AggregationArray::from_registry(&registry));
    {
        let mut aggregation = shared::write(&aggregation);
        aggregation.update(&mean_chain()).unwrap();
        let two = Chain::new().then(expand_channels(vec![
            Chain::new().then(interpolate_step(2, vec![0], EdgeMode::Reflect)),
            Chain::new().then(interpolate_step(2, vec![1], EdgeMode::Reflect)),
        ]));
        aggregation.spatial_expansion(&two, Some("two"), false).unwrap();
    }

    let mapping = ContinuousDispatcher::new(aggregation, fixtures.clone(), Chain::new());
    let err = mapping.apply(Parameter::Rgb, Some("two")).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));

    let state = shared::read(&fixtures);
    assert_eq!(state.rgb(), (&[0.0, 0.0][..], &[0.0, 0.0][..], &[0.0, 0.0][..]));
    assert_eq!(state.previous_rgb(), state.rgb());
}

#[test]
fn test_red_update_keeps_previous() {
    let mut fixtures = FixtureState::new(vec![101, 102, 103], &[101]).unwrap();
    fixtures.update_red(vec![10.0, 20.0, 30.0]).unwrap();
    fixtures.update_red(vec![11.0, 21.0, 31.0]).unwrap();

    assert_eq!(fixtures.previous(Channel::Red), &[10.0, 20.0, 30.0]);
    assert_eq!(fixtures.current(Channel::Red), &[11.0, 21.0, 31.0]);
    assert_eq!(fixtures.current(Channel::Green), &[0.0, 0.0, 0.0]);
}

#[test]
fn test_detector_fires_on_each_new_minimum() {
    let reference = shared::read(&shared(SampleBuffer::from_samples(vec![0.0; 4]))).series();
    let mut detector = TriggerDetector::new(10);
    let fired: Vec<bool> = [5.0, 5.0, 3.0, 3.0, 1.0]
        .into_iter()
        .map(|distance| detector.evaluate(&reference, &[10.0 - distance], false))
        .collect();
    assert_eq!(fired, vec![false, false, true, false, true]);
}

#[tokio::test(start_paused = true)]
async fn test_peak_crossing_centre_pulses_fixture() {
    let registry = BufferRegistry::with_keys(["/ecg"], 9);
    registry.ingest("/ecg", &[0.0; 9]).unwrap();
    let buffer = registry.get("/ecg").unwrap();

    let fixtures = shared(FixtureState::new(vec![1, 2], &[1]).unwrap());
    let dispatcher = EventDispatcher::new(buffer, QuerySource::Reference)
        .with_query_chain(Chain::new().then(peaks().with_param("height", 0.5)))
        .poll_interval(Duration::from_millis(5));
    let handle = dispatcher.shutdown_handle();

    let pulse = Pulse::intensity(vec![1], 100.0, 40.0, Duration::from_millis(50));
    let task = tokio::spawn(dispatcher.run(
        TriggerChain::new(CrossingDetector::new(4)),
        pulse.into_action(fixtures.clone()),
    ));

    // The peak enters at the newest end and moves one slot per sample
    registry.ingest("/ecg", &[1.0]).unwrap();
    let mut pulsed = false;
    for _ in 0..7 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.ingest("/ecg", &[0.0]).unwrap();
        pulsed |= shared::read(&fixtures).intensities()[0] == 100.0;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.shutdown();
    let stats = task.await.unwrap();

    assert!(pulsed);
    assert_eq!(stats.firings, 1);
    assert_eq!(stats.actions_completed, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(shared::read(&fixtures).intensities(), &[40.0, 0.0]);
}
