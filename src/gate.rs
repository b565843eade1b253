//! Usage gating consulted before a session starts.
//!
//! The capture pipeline itself never enforces quotas; [`crate::run`] asks a
//! [`UsageGate`] first and records the generation once delivery succeeded.

use async_trait::async_trait;
use serde::Deserialize;

use crate::PipelineError;

/// Result of a usage check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDecision {
    pub allowed: bool,
    /// Videos left in the current period; `-1` means unlimited.
    #[serde(default = "unlimited")]
    pub videos_remaining: i64,
    #[serde(default)]
    pub reset_at: Option<String>,
}

fn unlimited() -> i64 {
    -1
}

impl UsageDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            videos_remaining: -1,
            reset_at: None,
        }
    }

    pub fn deny(reset_at: impl Into<String>) -> Self {
        Self {
            allowed: false,
            videos_remaining: 0,
            reset_at: Some(reset_at.into()),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.videos_remaining < 0
    }
}

/// Collaborator supplying allow/deny and recording generations.
#[async_trait]
pub trait UsageGate: Send + Sync {
    async fn check(&self) -> Result<UsageDecision, PipelineError>;
    async fn record_generation(&self) -> Result<(), PipelineError>;
}

/// Gate that always allows and records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unmetered;

#[async_trait]
impl UsageGate for Unmetered {
    async fn check(&self) -> Result<UsageDecision, PipelineError> {
        Ok(UsageDecision::allow())
    }

    async fn record_generation(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Converts a denied decision into an error.
pub fn enforce(decision: UsageDecision) -> Result<(), PipelineError> {
    if decision.allowed {
        Ok(())
    } else {
        let reset = decision
            .reset_at
            .map(|at| format!("; limit resets at {at}"))
            .unwrap_or_default();
        Err(PipelineError::UsageDenied(format!(
            "video generation limit reached{reset}"
        )))
    }
}
