//! Telemetry collection for capture sessions.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

#[derive(Debug, Default)]
struct TelemetryState {
    stage_counts: HashMap<&'static str, u64>,
    bytes_sent: u64,
    completed_sessions: u64,
    failed_sessions: u64,
}

/// Snapshot of telemetry suitable for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub stage_counts: Vec<(String, u64)>,
    pub bytes_sent: u64,
    pub completed_sessions: u64,
    pub failed_sessions: u64,
}

impl TelemetrySnapshot {
    /// Count recorded for `stage`, zero when the stage never ran.
    pub fn stage(&self, stage: &str) -> u64 {
        self.stage_counts
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// Shared sink capturing per-stage events.
#[derive(Clone, Default)]
pub struct TelemetrySink {
    state: Arc<Mutex<TelemetryState>>,
}

impl TelemetrySink {
    /// Records one occurrence of a stage.
    pub fn record_stage(&self, stage: &'static str) {
        let mut state = self.state.lock().expect("telemetry mutex poisoned");
        *state.stage_counts.entry(stage).or_insert(0) += 1;
    }

    /// Records a transmitted batch payload.
    pub fn record_batch(&self, bytes: usize) {
        let mut state = self.state.lock().expect("telemetry mutex poisoned");
        *state.stage_counts.entry("transport").or_insert(0) += 1;
        state.bytes_sent += bytes as u64;
    }

    /// Records the outcome of a whole session.
    pub fn record_session(&self, succeeded: bool) {
        let mut state = self.state.lock().expect("telemetry mutex poisoned");
        if succeeded {
            state.completed_sessions += 1;
        } else {
            state.failed_sessions += 1;
        }
    }

    /// Exposes a snapshot for diagnostics and testing.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let state = self.state.lock().expect("telemetry mutex poisoned");
        let mut stage_counts: Vec<(String, u64)> = state
            .stage_counts
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        stage_counts.sort();
        TelemetrySnapshot {
            stage_counts,
            bytes_sent: state.bytes_sent,
            completed_sessions: state.completed_sessions,
            failed_sessions: state.failed_sessions,
        }
    }
}
