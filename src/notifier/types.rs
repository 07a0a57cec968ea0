use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::push::SendOutcome;

/// Per (instance, subscription) send result. Ephemeral: used to decide
/// cleanup and to build the run summary, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub instance_id: Uuid,
    pub subscription_id: Uuid,
    pub outcome: SendOutcome,
    pub at: DateTime<Utc>,
}

/// Result of one dispatch cycle, returned to the caller and logged.
/// No further business logic depends on it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchSummary {
    pub instances_considered: usize,
    pub subscriptions_considered: usize,
    pub attempted: usize,
    pub sent: usize,
    pub pruned_subscriptions: usize,
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchSummary {
    pub(crate) fn empty(instances_considered: usize) -> Self {
        Self {
            instances_considered,
            ..Self::default()
        }
    }

    /// Instance ids that reached at least one endpoint.
    pub fn notified_instances(&self) -> Vec<Uuid> {
        let mut seen = Vec::new();
        for outcome in &self.outcomes {
            if outcome.outcome == SendOutcome::Sent && !seen.contains(&outcome.instance_id) {
                seen.push(outcome.instance_id);
            }
        }
        seen
    }
}

/// Dispatch run lifecycle, reported through logs for operational visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Collecting,
    Dispatching,
    Reporting,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Collecting => "collecting",
            RunState::Dispatching => "dispatching",
            RunState::Reporting => "reporting",
        }
    }
}
