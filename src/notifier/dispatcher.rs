use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::push::{NotificationPayload, PushTransport, SendOutcome};
use crate::store::SubscriptionStore;
use crate::types::{PushSubscription, TaskInstance};

use super::types::{DispatchOutcome, DispatchSummary};

/// Fan-out engine: one notification per (due instance, subscription) pair,
/// isolated failure handling per pair.
pub struct NotificationDispatcher<'a> {
    subscriptions: &'a dyn SubscriptionStore,
    transport: &'a dyn PushTransport,
    max_concurrent: usize,
    tz: Tz,
}

impl<'a> NotificationDispatcher<'a> {
    pub fn new(
        subscriptions: &'a dyn SubscriptionStore,
        transport: &'a dyn PushTransport,
        max_concurrent: usize,
        tz: Tz,
    ) -> Self {
        Self {
            subscriptions,
            transport,
            max_concurrent,
            tz,
        }
    }

    /// Send every pair and apply cleanup policy to the outcomes. A failing
    /// pair never aborts the remaining pairs; the only writes this performs
    /// are idempotent deletes of gone subscriptions.
    pub fn dispatch(
        &self,
        due_instances: &[TaskInstance],
        subscriptions_by_owner: &HashMap<String, Vec<PushSubscription>>,
    ) -> DispatchSummary {
        let mut pairs: Vec<(TaskInstance, PushSubscription)> = Vec::new();
        for instance in due_instances {
            let Some(owner_subs) = subscriptions_by_owner.get(&instance.owner_id) else {
                continue;
            };
            for subscription in owner_subs {
                pairs.push((instance.clone(), subscription.clone()));
            }
        }

        let subscriptions_considered = subscriptions_by_owner
            .values()
            .map(|subs| subs.len())
            .sum();

        let mut summary = DispatchSummary::empty(due_instances.len());
        summary.subscriptions_considered = subscriptions_considered;
        if pairs.is_empty() {
            return summary;
        }

        let outcomes = self.send_all(pairs);
        self.apply_outcomes(outcomes, &mut summary);
        summary
    }

    /// Bounded fan-out: workers drain a shared channel of pairs so sends to
    /// independent endpoints overlap without exceeding the concurrency cap.
    fn send_all(
        &self,
        pairs: Vec<(TaskInstance, PushSubscription)>,
    ) -> Vec<DispatchOutcome> {
        let worker_count = self.max_concurrent.max(1).min(pairs.len());
        let (pair_tx, pair_rx) = crossbeam_channel::unbounded();
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();
        for pair in pairs {
            // Receiver is alive below; an unbounded send cannot fail here.
            let _ = pair_tx.send(pair);
        }
        drop(pair_tx);

        let transport = self.transport;
        let tz = self.tz;
        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                let pair_rx = pair_rx.clone();
                let outcome_tx = outcome_tx.clone();
                scope.spawn(move || {
                    for (instance, subscription) in pair_rx.iter() {
                        let payload = build_payload(&instance, tz);
                        let result = transport.send(&subscription, &payload);
                        let outcome = SendOutcome::classify(&result);
                        let _ = outcome_tx.send(DispatchOutcome {
                            instance_id: instance.id,
                            subscription_id: subscription.id,
                            outcome,
                            at: Utc::now(),
                        });
                    }
                });
            }
            drop(outcome_tx);
        });

        outcome_rx.iter().collect()
    }

    fn apply_outcomes(&self, outcomes: Vec<DispatchOutcome>, summary: &mut DispatchSummary) {
        let mut pruned: HashSet<Uuid> = HashSet::new();
        for outcome in &outcomes {
            summary.attempted += 1;
            match outcome.outcome {
                SendOutcome::Sent => summary.sent += 1,
                SendOutcome::Expired | SendOutcome::NotFound => {
                    if pruned.insert(outcome.subscription_id) {
                        match self.subscriptions.delete_subscription(outcome.subscription_id) {
                            Ok(()) => {
                                info!(
                                    subscription_id = %outcome.subscription_id,
                                    outcome = outcome.outcome.as_str(),
                                    "pruned gone push subscription"
                                );
                                summary.pruned_subscriptions += 1;
                            }
                            Err(err) => warn!(
                                subscription_id = %outcome.subscription_id,
                                "failed to prune subscription: {}",
                                err
                            ),
                        }
                    }
                }
                SendOutcome::PayloadTooLarge => {
                    // The payload shape is fixed and small; this means an
                    // upstream contract violation, so log and move on.
                    warn!(
                        instance_id = %outcome.instance_id,
                        subscription_id = %outcome.subscription_id,
                        "push payload rejected as too large"
                    );
                }
                SendOutcome::RateLimited => {
                    // No retry within this run; the next tick picks the
                    // instance up again if it is still inside the window.
                    info!(
                        subscription_id = %outcome.subscription_id,
                        "push endpoint rate limited"
                    );
                }
                SendOutcome::TransportError => {
                    warn!(
                        instance_id = %outcome.instance_id,
                        subscription_id = %outcome.subscription_id,
                        "push send failed in transport"
                    );
                }
            }
        }
        summary.outcomes = outcomes;
    }
}

pub(super) fn build_payload(instance: &TaskInstance, tz: Tz) -> NotificationPayload {
    NotificationPayload {
        title: format!("Task Started: {}", instance.title),
        body: schedule_text(instance, tz),
        icon: None,
        badge: None,
        // Tagging by instance lets the display agent coalesce duplicates.
        tag: Some(instance.id.to_string()),
        require_interaction: None,
    }
}

fn schedule_text(instance: &TaskInstance, tz: Tz) -> String {
    match (instance.start_time, instance.end_time) {
        (Some(start), Some(end)) => format!(
            "{} from {} to {}",
            instance.title,
            format_local(start, tz),
            format_local(end, tz)
        ),
        (Some(start), None) => format!("{} at {}", instance.title, format_local(start, tz)),
        _ => format!("{} scheduled for {}", instance.title, instance.date),
    }
}

fn format_local(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%H:%M").to_string()
}
