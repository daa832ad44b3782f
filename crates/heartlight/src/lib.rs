//! Heartlight: Realtime Biometric Lighting Pipeline
//!
//! Turns a continuous stream of sensor samples (an ECG trace, a breathing
//! belt) into fixture control values, and fires timed lighting actions when
//! temporal events such as a heartbeat peak are detected.
//!
//! - **Buffers** (`SampleBuffer`, `BufferRegistry`): fixed-capacity FIFOs fed
//!   by the ingestion adapter, with change-gated processing
//! - **Aggregation** (`AggregationArray`): one value per buffer, then spatial
//!   expansion across fixtures
//! - **Mapping** (`ContinuousDispatcher`): writes an expansion into fixture
//!   channels
//! - **Events** (`EventDispatcher`, `TriggerChain`): polls a trigger against
//!   a buffer and spawns actions (`Ramp`, `Pulse`) when it fires
//! - **Fixtures** (`FixtureState`): double-buffered per-channel values read by
//!   protocol adapters

pub mod actions;
pub mod aggregation;
pub mod buffer;
pub mod chain;
pub mod continuous;
pub mod error;
pub mod events;
pub mod expansion;
pub mod fixtures;
pub mod functions;
pub mod gate;
pub mod registry;
pub mod shared;
pub mod signal;
pub mod trigger;

pub use actions::{ramp_value, Pulse, Ramp};
pub use aggregation::AggregationArray;
pub use buffer::{SampleBuffer, Series, SharedBuffer};
pub use chain::{Chain, Params, Statistic, Stats, Step};
pub use continuous::ContinuousDispatcher;
pub use error::{Error, Result};
pub use events::{action, Action, DispatchStats, EventDispatcher, QuerySource, ShutdownHandle};
pub use expansion::EdgeMode;
pub use fixtures::{Channel, FixtureFrame, FixtureId, FixtureState, Parameter};
pub use gate::{Gating, TickGate};
pub use registry::BufferRegistry;
pub use shared::{shared, Shared};
pub use signal::Signal;
pub use trigger::{CrossingDetector, TriggerChain, TriggerDetector, TriggerSource};
