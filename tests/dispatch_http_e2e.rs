use chrono::{DateTime, Duration, NaiveDate, Utc};
use mockito::{Matcher, Server};
use std::time::Duration as StdDuration;
use tempfile::TempDir;
use uuid::Uuid;

use goalpulse::config::EngineConfig;
use goalpulse::push::HttpPushTransport;
use goalpulse::store::{InstanceStore, SqliteStore, SubscriptionStore};
use goalpulse::types::{CompletionState, PushSubscription, TaskInstance};
use goalpulse::DispatchRunner;

fn utc(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid rfc3339")
        .with_timezone(&Utc)
}

fn timed_instance(owner: &str, start_raw: &str) -> TaskInstance {
    let start = utc(start_raw);
    TaskInstance {
        id: Uuid::new_v4(),
        template_id: None,
        title: "Stretch".to_string(),
        date: NaiveDate::parse_from_str("2024-06-01", "%Y-%m-%d").expect("valid date"),
        start_time: Some(start),
        end_time: Some(start + Duration::minutes(30)),
        completion: CompletionState::Pending,
        completed_at: None,
        owner_id: owner.to_string(),
        notified_at: None,
    }
}

fn subscription(owner: &str, endpoint: String) -> PushSubscription {
    PushSubscription {
        id: Uuid::new_v4(),
        owner_id: owner.to_string(),
        endpoint,
        p256dh_key: "p256dh-key".to_string(),
        auth_key: "auth-key".to_string(),
        created_at: Utc::now(),
    }
}

#[test]
fn push_delivery_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new();
    let push_mock = server
        .mock("POST", "/push/abc")
        .match_header("content-type", "application/json")
        .match_header("x-push-p256dh", "p256dh-key")
        .match_header("x-push-auth", "auth-key")
        .match_body(Matcher::PartialJsonString(
            r#"{"title":"Task Started: Stretch"}"#.to_string(),
        ))
        .with_status(201)
        .create();

    let temp = TempDir::new()?;
    let store = SqliteStore::new(temp.path().join("tasks.db"))?;
    store.insert_instances(&[timed_instance("user-1", "2024-06-01T13:00:00Z")])?;
    store.replace_subscription(&subscription("user-1", format!("{}/push/abc", server.url())))?;

    let config = EngineConfig::default();
    let transport = HttpPushTransport::new(StdDuration::from_secs(5));
    let mut runner = DispatchRunner::new(&store, &store, &transport, &config);
    let summary = runner.run_cycle_at(utc("2024-06-01T13:03:00Z"), None)?;

    push_mock.assert();
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.pruned_subscriptions, 0);
    Ok(())
}

#[test]
fn gone_endpoint_is_pruned_over_http() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new();
    let gone_mock = server.mock("POST", "/push/gone").with_status(410).create();

    let temp = TempDir::new()?;
    let store = SqliteStore::new(temp.path().join("tasks.db"))?;
    store.insert_instances(&[timed_instance("user-1", "2024-06-01T13:00:00Z")])?;
    store.replace_subscription(&subscription("user-1", format!("{}/push/gone", server.url())))?;

    let config = EngineConfig::default();
    let transport = HttpPushTransport::new(StdDuration::from_secs(5));
    let mut runner = DispatchRunner::new(&store, &store, &transport, &config);
    let summary = runner.run_cycle_at(utc("2024-06-01T13:03:00Z"), None)?;

    gone_mock.assert();
    assert_eq!(summary.sent, 0);
    assert_eq!(summary.pruned_subscriptions, 1);
    assert!(store.subscriptions_for_owner("user-1")?.is_empty());

    // The instance was never notified, so the next cycle still sees it —
    // with no endpoints left there is nothing to attempt.
    let next = runner.run_cycle_at(utc("2024-06-01T13:04:00Z"), None)?;
    assert_eq!(next.instances_considered, 1);
    assert_eq!(next.attempted, 0);
    Ok(())
}
