use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::push::PushTransport;
use crate::store::{InstanceStore, SubscriptionStore};
use crate::types::{EngineError, PushSubscription};

use super::dispatcher::NotificationDispatcher;
use super::types::{DispatchSummary, RunState};
use super::window::DueWindow;

/// One-cycle orchestrator: window → due query → fan-out → summary.
///
/// Invoked once per external scheduler tick. It carries no mutual exclusion
/// of its own; an accidental concurrent run is safe because subscription
/// deletes are delete-by-id and duplicate sends are bounded by the
/// notified-at stamp.
pub struct DispatchRunner<'a> {
    instances: &'a dyn InstanceStore,
    subscriptions: &'a dyn SubscriptionStore,
    transport: &'a dyn PushTransport,
    config: &'a EngineConfig,
    state: RunState,
}

impl<'a> DispatchRunner<'a> {
    pub fn new(
        instances: &'a dyn InstanceStore,
        subscriptions: &'a dyn SubscriptionStore,
        transport: &'a dyn PushTransport,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            instances,
            subscriptions,
            transport,
            config,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn set_state(&mut self, state: RunState) {
        self.state = state;
        debug!(state = state.as_str(), "run state changed");
    }

    /// Run one dispatch cycle against the wall clock.
    pub fn run_cycle(
        &mut self,
        owner_scope: Option<&str>,
    ) -> Result<DispatchSummary, EngineError> {
        self.run_cycle_at(Utc::now(), owner_scope)
    }

    /// Run one dispatch cycle at an explicit instant. Store read failures
    /// abort the run; per-send failures never do.
    pub fn run_cycle_at(
        &mut self,
        now: DateTime<Utc>,
        owner_scope: Option<&str>,
    ) -> Result<DispatchSummary, EngineError> {
        self.set_state(RunState::Collecting);
        let result = self.collect_and_dispatch(now, owner_scope);
        self.set_state(RunState::Idle);
        result
    }

    fn collect_and_dispatch(
        &mut self,
        now: DateTime<Utc>,
        owner_scope: Option<&str>,
    ) -> Result<DispatchSummary, EngineError> {
        let window = DueWindow::compute(
            now,
            self.config.timezone,
            self.config.back_buffer(),
            self.config.lookahead(),
        );
        debug!(
            local_date = %window.local_date,
            start = %window.start_utc,
            end = %window.end_utc,
            "computed due window"
        );

        let due = self.instances.list_due_instances(owner_scope, &window)?;
        if due.is_empty() {
            debug!("no due instances in window");
            return Ok(DispatchSummary::empty(0));
        }

        let mut subscriptions_by_owner: HashMap<String, Vec<PushSubscription>> = HashMap::new();
        for instance in &due {
            if !subscriptions_by_owner.contains_key(&instance.owner_id) {
                let subs = self.subscriptions.subscriptions_for_owner(&instance.owner_id)?;
                subscriptions_by_owner.insert(instance.owner_id.clone(), subs);
            }
        }

        self.set_state(RunState::Dispatching);
        let dispatcher = NotificationDispatcher::new(
            self.subscriptions,
            self.transport,
            self.config.max_concurrent_sends,
            self.config.timezone,
        );
        let summary = dispatcher.dispatch(&due, &subscriptions_by_owner);

        self.set_state(RunState::Reporting);
        for instance_id in summary.notified_instances() {
            // A failed stamp only means the next overlapping run may notify
            // again; approximate delivery is the accepted trade-off.
            if let Err(err) = self.instances.mark_notified(instance_id, now) {
                warn!(instance_id = %instance_id, "failed to stamp notified_at: {}", err);
            }
        }
        info!(
            instances = summary.instances_considered,
            subscriptions = summary.subscriptions_considered,
            attempted = summary.attempted,
            sent = summary.sent,
            pruned = summary.pruned_subscriptions,
            "dispatch cycle finished"
        );
        Ok(summary)
    }
}
