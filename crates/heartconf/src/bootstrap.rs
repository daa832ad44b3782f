//! Bootstrap configuration - seeds pipeline state, then the pipeline owns it.

use serde::{Deserialize, Serialize};

/// Sample buffer sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffersConfig {
    /// Samples retained per channel.
    /// Default: 2560 (ten seconds at 256 Hz)
    #[serde(default = "BuffersConfig::default_capacity")]
    pub capacity: usize,

    /// Sensor sample rate in Hz.
    /// Default: 256
    #[serde(default = "BuffersConfig::default_sample_rate")]
    pub sample_rate: u32,
}

impl BuffersConfig {
    fn default_capacity() -> usize {
        2560
    }

    fn default_sample_rate() -> u32 {
        256
    }
}

impl Default for BuffersConfig {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
            sample_rate: Self::default_sample_rate(),
        }
    }
}

/// When the aggregation pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GatingConfig {
    /// Run whenever any buffer received samples.
    #[default]
    Update,
    /// Run on a fixed cadence.
    Time {
        #[serde(default = "GatingConfig::default_interval_ms")]
        interval_ms: u64,
    },
}

impl GatingConfig {
    fn default_interval_ms() -> u64 {
        1000
    }
}

/// Fixture layout and ramp timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingConfig {
    /// Fixture ids in spatial order.
    #[serde(default = "LightingConfig::default_fixtures")]
    pub fixtures: Vec<u32>,

    /// Fixtures that receive the aggregated values directly; the rest are
    /// interpolated between them.
    #[serde(default = "LightingConfig::default_anchors")]
    pub anchors: Vec<u32>,

    /// Duration of the transition ramp after each mapping update.
    /// Default: 1000
    #[serde(default = "LightingConfig::default_ramp_ms")]
    pub ramp_ms: u64,

    /// Spacing of ramp steps.
    /// Default: 500
    #[serde(default = "LightingConfig::default_ramp_step_ms")]
    pub ramp_step_ms: u64,
}

impl LightingConfig {
    fn default_fixtures() -> Vec<u32> {
        (101..=112).collect()
    }

    fn default_anchors() -> Vec<u32> {
        vec![101, 106, 112]
    }

    fn default_ramp_ms() -> u64 {
        1000
    }

    fn default_ramp_step_ms() -> u64 {
        500
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            fixtures: Self::default_fixtures(),
            anchors: Self::default_anchors(),
            ramp_ms: Self::default_ramp_ms(),
            ramp_step_ms: Self::default_ramp_step_ms(),
        }
    }
}

/// Value range and spatial policy of the continuous mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Input value mapped to the bottom of the output range (e.g. 60 BPM).
    #[serde(default = "MappingConfig::default_low")]
    pub low: f64,

    /// Input value mapped to the top of the output range (e.g. 120 BPM).
    #[serde(default = "MappingConfig::default_high")]
    pub high: f64,

    /// Interpolation edge policy: "reflect" or "wrap".
    #[serde(default = "MappingConfig::default_edge_mode")]
    pub edge_mode: String,

    /// Fixture parameter written by the mapping: intensity, red, ..., rgb, rgbw.
    #[serde(default = "MappingConfig::default_parameter")]
    pub parameter: String,

    #[serde(default)]
    pub gating: GatingConfig,
}

impl MappingConfig {
    fn default_low() -> f64 {
        60.0
    }

    fn default_high() -> f64 {
        120.0
    }

    fn default_edge_mode() -> String {
        "reflect".to_string()
    }

    fn default_parameter() -> String {
        "rgb".to_string()
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            low: Self::default_low(),
            high: Self::default_high(),
            edge_mode: Self::default_edge_mode(),
            parameter: Self::default_parameter(),
            gating: GatingConfig::default(),
        }
    }
}

/// Event trigger polling and the pulse it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Delay between polls. Zero yields to the runtime without sleeping.
    /// Default: 5
    #[serde(default = "TriggerConfig::default_poll_ms")]
    pub poll_ms: u64,

    /// Intensity during the pulse.
    #[serde(default = "TriggerConfig::default_pulse_on")]
    pub pulse_on: f64,

    /// Intensity outside the pulse.
    #[serde(default = "TriggerConfig::default_pulse_off")]
    pub pulse_off: f64,

    /// Time between the two pulse levels.
    /// Default: 100
    #[serde(default = "TriggerConfig::default_pulse_wait_ms")]
    pub pulse_wait_ms: u64,
}

impl TriggerConfig {
    fn default_poll_ms() -> u64 {
        5
    }

    fn default_pulse_on() -> f64 {
        100.0
    }

    fn default_pulse_off() -> f64 {
        40.0
    }

    fn default_pulse_wait_ms() -> u64 {
        100
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            poll_ms: Self::default_poll_ms(),
            pulse_on: Self::default_pulse_on(),
            pulse_off: Self::default_pulse_off(),
            pulse_wait_ms: Self::default_pulse_wait_ms(),
        }
    }
}

/// Bootstrap configuration - seeds pipeline state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub buffers: BuffersConfig,

    #[serde(default)]
    pub lighting: LightingConfig,

    #[serde(default)]
    pub mapping: MappingConfig,

    #[serde(default)]
    pub trigger: TriggerConfig,
}
