//! heartlight - biometric lighting pipeline
//!
//! Wires the pipeline from config:
//! - one sample buffer per ingest address, fed by a synthetic pulse source
//!   standing in for the transport at `ingest.bind`
//! - heart rate per buffer, expanded across the fixtures and mapped into
//!   fixture channels, ramped from the values currently on show
//! - a beat trigger per buffer that pulses that buffer's anchor fixture
//! - a frame logger standing in for the console adapter

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use heartconf::HeartConfig;
use heartlight::expansion::{expand_channels, fill_step, interpolate_step};
use heartlight::functions::{bpm, clip, flip_range, identity, peaks, range_scaler, zeros};
use heartlight::shared::{self, shared, Shared};
use heartlight::{
    AggregationArray, BufferRegistry, Chain, ContinuousDispatcher, CrossingDetector, EdgeMode,
    EventDispatcher, FixtureState, Gating, Parameter, Pulse, QuerySource, Ramp, Statistic,
    TriggerChain,
};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

#[derive(Parser)]
#[command(name = "heartlight")]
#[command(about = "Drive lighting fixtures from biometric sample streams")]
#[command(version)]
struct Cli {
    /// Config file (used instead of ./heartlight.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective config and exit
    #[arg(long)]
    print_config: bool,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Heart rate of the synthetic source; each further address runs 6 BPM faster
    #[arg(long, default_value = "72")]
    bpm: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = HeartConfig::load_with_sources_from(cli.config.as_deref())
        .context("loading configuration")?;

    if cli.print_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.infra.telemetry.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("heartlight {} starting", env!("CARGO_PKG_VERSION"));
    info!(files = ?sources.files, env = ?sources.env_overrides, "configuration loaded");

    let bind = config.infra.ingest.bind_addr()?;
    let bootstrap = &config.bootstrap;
    let sample_rate = f64::from(bootstrap.buffers.sample_rate);
    let registry = BufferRegistry::with_keys(
        config.infra.ingest.addresses.iter().cloned(),
        bootstrap.buffers.capacity,
    );

    let fixtures = FixtureState::new(
        bootstrap.lighting.fixtures.clone(),
        &bootstrap.lighting.anchors,
    )
    .context("building fixture state")?;
    let expansion = expansion_chain(&config, &fixtures)?;
    let fixtures = shared(fixtures);

    let aggregation = shared(AggregationArray::from_registry(&registry));
    let parameter: Parameter = bootstrap.mapping.parameter.parse()?;
    let mapping = ContinuousDispatcher::new(
        aggregation.clone(),
        fixtures.clone(),
        Chain::new()
            .then(
                range_scaler(0.0, 100.0)
                    .with_param("old_min", bootstrap.mapping.low)
                    .with_param("old_max", bootstrap.mapping.high),
            )
            .then(clip(0.0, 100.0)),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(synthetic_source(
        registry.clone(),
        bind,
        sample_rate,
        cli.bpm,
        shutdown_tx.subscribe(),
    )));

    tasks.push(tokio::spawn(mapping_loop(
        aggregation.clone(),
        mapping,
        Chain::new().then(beat_peaks(sample_rate)).then(bpm(sample_rate)),
        expansion,
        MappingTiming {
            gating: Gating::from(&bootstrap.mapping.gating),
            parameter,
            frame: Duration::from_millis(config.infra.console.frame_ms.max(1)),
            ramp: Duration::from_millis(bootstrap.lighting.ramp_ms),
            ramp_step: Duration::from_millis(bootstrap.lighting.ramp_step_ms),
        },
        fixtures.clone(),
        shutdown_tx.subscribe(),
    )));

    tasks.push(tokio::spawn(frame_logger(
        fixtures.clone(),
        Duration::from_millis(config.infra.console.frame_ms.max(1)),
        config.infra.console.target.clone(),
        shutdown_tx.subscribe(),
    )));

    let trigger = &bootstrap.trigger;
    let mut dispatchers = Vec::new();
    for (i, (key, buffer)) in registry.buffers().enumerate() {
        let targets = match bootstrap.lighting.anchors.get(i) {
            Some(anchor) => vec![*anchor],
            None => bootstrap.lighting.fixtures.clone(),
        };
        let pulse = Pulse::intensity(
            targets,
            trigger.pulse_on,
            trigger.pulse_off,
            Duration::from_millis(trigger.pulse_wait_ms),
        );

        let key = key.to_string();
        let dispatcher = EventDispatcher::new(buffer.clone(), QuerySource::Reference)
            .with_query_chain(Chain::new().then(beat_peaks(sample_rate)))
            .poll_interval(Duration::from_millis(trigger.poll_ms))
            .on_error({
                let key = key.clone();
                move |e| debug!(buffer.key = %key, error = %e, "beat trigger poll failed")
            });
        let handle = dispatcher.shutdown_handle();
        let detector = CrossingDetector::new(shared::read(buffer).centre_index());
        let task = tokio::spawn(
            dispatcher.run(TriggerChain::new(detector), pulse.into_action(fixtures.clone())),
        );
        info!(buffer.key = %key, "beat trigger armed");
        dispatchers.push((key, handle, task));
    }

    let duration = cli.duration_secs.map(Duration::from_secs);
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down");
        }
        _ = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        } => {
            info!("run duration elapsed, shutting down");
        }
    }

    let _ = shutdown_tx.send(());
    for (_, handle, _) in &dispatchers {
        handle.shutdown();
    }
    for (key, _, task) in dispatchers {
        match task.await {
            Ok(stats) => info!(
                buffer.key = %key,
                polls = stats.polls,
                firings = stats.firings,
                errors = stats.errors,
                actions_completed = stats.actions_completed,
                actions_failed = stats.actions_failed,
                "beat trigger stopped"
            ),
            Err(e) => warn!(buffer.key = %key, error = %e, "beat trigger task failed"),
        }
    }
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task failed");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// R-peak detection tuned for a normalised ECG trace: peaks above half
/// amplitude, at least 250ms apart.
fn beat_peaks(sample_rate: f64) -> heartlight::Step {
    peaks()
        .with_param("height", 0.5)
        .with_param("distance", (sample_rate * 0.25).max(1.0))
}

/// Chain turning the per-buffer values into per-fixture arrays for the
/// configured parameter.
fn expansion_chain(config: &HeartConfig, fixtures: &FixtureState) -> Result<Chain> {
    let mapping = &config.bootstrap.mapping;
    let edge_mode: EdgeMode = mapping.edge_mode.parse()?;
    let parameter: Parameter = mapping.parameter.parse()?;
    let anchors = fixtures.anchor_positions().to_vec();
    let buffers = config.infra.ingest.addresses.len();

    let spread = if anchors.len() == buffers {
        interpolate_step(fixtures.len(), anchors, edge_mode)
    } else {
        warn!(
            anchors = anchors.len(),
            buffers, "anchor count differs from buffer count, broadcasting the mean"
        );
        fill_step(fixtures.len()).with_param("value", Statistic::Mean)
    };

    let chain = Chain::new().then(spread);
    let dark = || Chain::new().then(zeros());
    Ok(match parameter {
        Parameter::Rgb => chain.then(expand_channels(vec![
            Chain::new().then(identity()),
            dark(),
            Chain::new().then(flip_range(mapping.low, mapping.high)),
        ])),
        Parameter::Rgbw => chain.then(expand_channels(vec![
            Chain::new().then(identity()),
            dark(),
            Chain::new().then(flip_range(mapping.low, mapping.high)),
            dark(),
        ])),
        _ => chain,
    })
}

/// Stand-in for the ingestion transport bound at `bind`: a normalised
/// ECG-like pulse train per address, delivered in 40ms chunks.
async fn synthetic_source(
    registry: BufferRegistry,
    bind: SocketAddr,
    sample_rate: f64,
    base_bpm: f64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let chunk = Duration::from_millis(40);
    let per_chunk = ((sample_rate * chunk.as_secs_f64()).round() as usize).max(1);
    let keys: Vec<String> = registry.keys().map(str::to_string).collect();
    let mut ticker = tokio::time::interval(chunk);
    let mut sample = 0u64;
    info!(%bind, addresses = ?keys, "synthetic source feeding ingest addresses");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        for (i, key) in keys.iter().enumerate() {
            let period = 60.0 / (base_bpm + 6.0 * i as f64).max(1.0);
            let samples: Vec<f64> = (0..per_chunk as u64)
                .map(|n| {
                    let t = (sample + n) as f64 / sample_rate;
                    let phase = t % period - 0.1;
                    (-(phase / 0.015).powi(2)).exp()
                })
                .collect();
            if let Err(e) = registry.ingest_address(key, &samples) {
                warn!(buffer.key = %key, error = %e, "synthetic ingest failed");
            }
        }
        sample += per_chunk as u64;
    }
    debug!(samples = sample, "synthetic source stopped");
}

struct MappingTiming {
    gating: Gating,
    parameter: Parameter,
    frame: Duration,
    ramp: Duration,
    ramp_step: Duration,
}

/// Gated aggregation, expansion and mapping. New fixture values are reached
/// by a ramp from what the fixtures currently show.
async fn mapping_loop(
    aggregation: Shared<AggregationArray>,
    mapping: ContinuousDispatcher,
    reduce: Chain,
    expansion: Chain,
    timing: MappingTiming,
    fixtures: Shared<FixtureState>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(timing.frame);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        let ran = {
            let mut aggregation = shared::write(&aggregation);
            aggregation
                .update_tick(&reduce, timing.gating)
                .and_then(|ran| {
                    if ran {
                        aggregation.spatial_expansion(&expansion, Some("fixtures"), false)?;
                    }
                    Ok(ran)
                })
        };

        match ran {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                warn!(error = %e, "aggregation pass failed");
                continue;
            }
        }

        if timing.ramp.is_zero() {
            if let Err(e) = mapping.apply(timing.parameter, Some("fixtures")) {
                warn!(error = %e, "mapping failed");
            }
            continue;
        }

        let ramp = mapping
            .evaluate(timing.parameter, Some("fixtures"))
            .and_then(|targets| {
                Ramp::towards(&shared::read(&fixtures), targets, timing.ramp, timing.ramp_step)
            });
        let ramp = match ramp {
            Ok(ramp) => ramp,
            Err(e) => {
                warn!(error = %e, "mapping failed");
                continue;
            }
        };
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            result = ramp.run(&fixtures) => {
                if let Err(e) = result {
                    warn!(error = %e, "ramp failed");
                }
            }
        }
    }
    debug!("mapping loop stopped");
}

/// Reads fixture state once per frame, the way a console adapter would.
async fn frame_logger(
    fixtures: Shared<FixtureState>,
    frame: Duration,
    target: String,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(frame);
    let mut frames = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }
        frames += 1;
        let snapshot = shared::read(&fixtures).frame();
        match serde_json::to_string(&snapshot) {
            Ok(payload) => trace!(console = %target, frame = frames, %payload, "fixture frame"),
            Err(e) => warn!(error = %e, "fixture frame not serializable"),
        }
    }
    debug!(frames, "frame logger stopped");
}
