//! User-presence gate (biometric / device credential) for protected entries

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Protection recorded alongside each stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessControl {
    #[default]
    None,
    UserPresence,
}

/// Result of asking the platform for user presence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Granted,
    Denied,
    Cancelled,
}

/// Platform hook that confirms user presence before protected reads.
#[async_trait]
pub trait AccessGate: Send + Sync {
    async fn confirm_presence(&self, reason: &str) -> GateOutcome;
}

/// Gate for environments without a presence check (CLI, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGrant;

#[async_trait]
impl AccessGate for AlwaysGrant {
    async fn confirm_presence(&self, _reason: &str) -> GateOutcome {
        GateOutcome::Granted
    }
}

/// Gate that answers with a fixed outcome and counts prompts.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct FixedGate {
    pub outcome: GateOutcome,
    pub prompts: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl FixedGate {
    pub fn new(outcome: GateOutcome) -> Self {
        Self {
            outcome,
            prompts: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl AccessGate for FixedGate {
    async fn confirm_presence(&self, _reason: &str) -> GateOutcome {
        self.prompts
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.outcome
    }
}
