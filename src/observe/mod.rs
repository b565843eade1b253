//! Observation primitives: telemetry counters, completion events and progress.

pub mod events;
pub mod progress;
pub mod telemetry;
