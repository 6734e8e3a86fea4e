//! Sense Core - Hardware-independent runtime for the sense-node firmware
//!
//! This crate contains the connectivity-and-resilience runtime: network mode
//! state machine, MQTT session life-cycle, liveness watchdog, button gesture
//! classification, OTA update control and the orchestration loop that binds
//! them into one device lifecycle. Everything here is pure logic driven by an
//! explicit `now_ms` clock and driver traits, so it can be tested on the host
//! platform without ESP32 hardware.

pub mod button;
pub mod config;
pub mod discovery;
pub mod light;
pub mod mqtt;
pub mod net;
pub mod runtime;
pub mod update;
pub mod version;
pub mod watchdog;

pub use button::{GestureClassifier, GestureConfig, PressEvent};
pub use config::{ConfigStore, DeviceConfig};
pub use runtime::{
    ClimateReading, Collaborators, ConfigPortal, Identity, RestartReason, Runtime, TickInputs,
    TickOutcome,
};
pub use watchdog::LivenessWatchdog;
