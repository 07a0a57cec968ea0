//! Store contracts consumed by the engine, plus a SQLite reference adapter.
//!
//! The production deployment talks to a remote relational store; the engine
//! only depends on the two traits below. `SqliteStore` satisfies both and is
//! what the operational binary and the test suite run against.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::notifier::DueWindow;
use crate::types::{
    CompletionState, EngineError, PushSubscription, RecurrenceRule, TaskInstance, TaskTemplate,
    TimeOfDay,
};

mod schema;

use schema::STORE_SCHEMA;

/// Read/write contract for task instances.
pub trait InstanceStore {
    /// Dates in `[start, end]` that already carry an instance of the template.
    fn existing_dates(
        &self,
        template_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashSet<NaiveDate>, EngineError>;

    /// Persist a batch atomically. A failure leaves nothing behind.
    fn insert_instances(&self, instances: &[TaskInstance]) -> Result<(), EngineError>;

    /// Pending, not-yet-notified instances whose start time falls inside the
    /// window on the window's local calendar date, ordered by start time.
    fn list_due_instances(
        &self,
        owner_scope: Option<&str>,
        window: &DueWindow,
    ) -> Result<Vec<TaskInstance>, EngineError>;

    /// Stamp an instance as notified. Idempotent: only the first stamp sticks.
    fn mark_notified(&self, instance_id: Uuid, at: DateTime<Utc>) -> Result<(), EngineError>;
}

/// Registry of push endpoints, one live subscription per owner assumed.
pub trait SubscriptionStore {
    fn subscriptions_for_owner(&self, owner_id: &str)
        -> Result<Vec<PushSubscription>, EngineError>;

    fn subscription_owners(&self) -> Result<Vec<String>, EngineError>;

    /// Delete by id; deleting an already-deleted subscription is a no-op.
    fn delete_subscription(&self, id: Uuid) -> Result<(), EngineError>;
}

#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection, EngineError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // Needed for template deletion to cascade into instances.
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(STORE_SCHEMA)?;
        Ok(conn)
    }

    pub fn upsert_template(&self, template: &TaskTemplate) -> Result<(), EngineError> {
        let conn = self.open()?;
        let rule = encode_rule(&template.rule)?;
        conn.execute(
            "INSERT INTO task_templates (id, title, rule, goal_id, owner_id, start_of_day, end_of_day)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
                 title = excluded.title,
                 rule = excluded.rule,
                 goal_id = excluded.goal_id,
                 owner_id = excluded.owner_id,
                 start_of_day = excluded.start_of_day,
                 end_of_day = excluded.end_of_day",
            params![
                template.id.to_string(),
                template.title.as_str(),
                rule,
                template.goal_id.map(|id| id.to_string()),
                template.owner_id.as_str(),
                template.time_of_day.map(|tod| format_time(tod.start)),
                template.time_of_day.map(|tod| format_time(tod.end)),
            ],
        )?;
        Ok(())
    }

    /// Deleting a template cascades deletion of every instance it spawned.
    pub fn delete_template(&self, template_id: Uuid) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM task_templates WHERE id = ?1",
            params![template_id.to_string()],
        )?;
        Ok(())
    }

    pub fn templates(&self) -> Result<Vec<TaskTemplate>, EngineError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, rule, goal_id, owner_id, start_of_day, end_of_day
             FROM task_templates
             ORDER BY title",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut templates = Vec::new();
        for row in rows {
            let (id_raw, title, rule_raw, goal_raw, owner_id, start_raw, end_raw) = row?;
            let time_of_day = match (start_raw, end_raw) {
                (Some(start), Some(end)) => Some(TimeOfDay {
                    start: parse_time(&start)?,
                    end: parse_time(&end)?,
                }),
                _ => None,
            };
            templates.push(TaskTemplate {
                id: Uuid::parse_str(&id_raw)?,
                title,
                rule: decode_rule(&rule_raw)?,
                goal_id: goal_raw.map(|raw| Uuid::parse_str(&raw)).transpose()?,
                owner_id,
                time_of_day,
            });
        }
        Ok(templates)
    }

    pub fn set_completion(
        &self,
        instance_id: Uuid,
        completion: CompletionState,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE task_instances SET completion = ?1, completed_at = ?2 WHERE id = ?3",
            params![
                completion.as_str(),
                completed_at.map(format_datetime),
                instance_id.to_string()
            ],
        )?;
        Ok(())
    }

    /// Register a push endpoint. A new registration replaces the owner's
    /// previous subscription rather than appending to it.
    pub fn replace_subscription(&self, subscription: &PushSubscription) -> Result<(), EngineError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM push_subscriptions WHERE owner_id = ?1",
            params![subscription.owner_id.as_str()],
        )?;
        tx.execute(
            "INSERT INTO push_subscriptions (id, owner_id, endpoint, p256dh_key, auth_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                subscription.id.to_string(),
                subscription.owner_id.as_str(),
                subscription.endpoint.as_str(),
                subscription.p256dh_key.as_str(),
                subscription.auth_key.as_str(),
                format_datetime(subscription.created_at),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl InstanceStore for SqliteStore {
    fn existing_dates(
        &self,
        template_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashSet<NaiveDate>, EngineError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT date FROM task_instances
             WHERE template_id = ?1 AND date >= ?2 AND date <= ?3",
        )?;
        let rows = stmt.query_map(
            params![
                template_id.to_string(),
                format_date(start),
                format_date(end)
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut dates = HashSet::new();
        for row in rows {
            dates.insert(parse_date(&row?)?);
        }
        Ok(dates)
    }

    fn insert_instances(&self, instances: &[TaskInstance]) -> Result<(), EngineError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        {
            // OR IGNORE keeps a concurrent expansion of the same range benign:
            // the (template_id, date) unique index swallows the duplicate.
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO task_instances
                     (id, template_id, title, date, start_time, end_time,
                      completion, completed_at, owner_id, notified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for instance in instances {
                stmt.execute(params![
                    instance.id.to_string(),
                    instance.template_id.map(|id| id.to_string()),
                    instance.title.as_str(),
                    format_date(instance.date),
                    instance.start_time.map(format_datetime),
                    instance.end_time.map(format_datetime),
                    instance.completion.as_str(),
                    instance.completed_at.map(format_datetime),
                    instance.owner_id.as_str(),
                    instance.notified_at.map(format_datetime),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn list_due_instances(
        &self,
        owner_scope: Option<&str>,
        window: &DueWindow,
    ) -> Result<Vec<TaskInstance>, EngineError> {
        let conn = self.open()?;
        let mut sql = String::from(
            "SELECT id, template_id, title, date, start_time, end_time,
                    completion, completed_at, owner_id, notified_at
             FROM task_instances
             WHERE date = ?1
               AND start_time IS NOT NULL
               AND start_time >= ?2
               AND start_time < ?3
               AND completion = 'pending'
               AND notified_at IS NULL",
        );
        if owner_scope.is_some() {
            sql.push_str(" AND owner_id = ?4");
        }
        sql.push_str(" ORDER BY start_time");

        let mut stmt = conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, Option<String>>(9)?,
            ))
        };
        let date = format_date(window.local_date);
        let start = format_datetime(window.start_utc);
        let end = format_datetime(window.end_utc);
        let rows: Vec<RawInstanceRow> = match owner_scope {
            Some(owner) => stmt
                .query_map(params![date, start, end, owner], map_row)?
                .collect::<Result<_, _>>()?,
            None => stmt
                .query_map(params![date, start, end], map_row)?
                .collect::<Result<_, _>>()?,
        };

        let mut instances = Vec::with_capacity(rows.len());
        for row in rows {
            instances.push(instance_from_row(row)?);
        }
        Ok(instances)
    }

    fn mark_notified(&self, instance_id: Uuid, at: DateTime<Utc>) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE task_instances SET notified_at = ?1
             WHERE id = ?2 AND notified_at IS NULL",
            params![format_datetime(at), instance_id.to_string()],
        )?;
        Ok(())
    }
}

impl SubscriptionStore for SqliteStore {
    fn subscriptions_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<PushSubscription>, EngineError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, endpoint, p256dh_key, auth_key, created_at
             FROM push_subscriptions
             WHERE owner_id = ?1
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut subscriptions = Vec::new();
        for row in rows {
            let (id_raw, owner_id, endpoint, p256dh_key, auth_key, created_raw) = row?;
            subscriptions.push(PushSubscription {
                id: Uuid::parse_str(&id_raw)?,
                owner_id,
                endpoint,
                p256dh_key,
                auth_key,
                created_at: parse_datetime(&created_raw)?,
            });
        }
        Ok(subscriptions)
    }

    fn subscription_owners(&self) -> Result<Vec<String>, EngineError> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT owner_id FROM push_subscriptions ORDER BY owner_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut owners = Vec::new();
        for row in rows {
            owners.push(row?);
        }
        Ok(owners)
    }

    fn delete_subscription(&self, id: Uuid) -> Result<(), EngineError> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM push_subscriptions WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }
}

type RawInstanceRow = (
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    String,
    Option<String>,
);

fn instance_from_row(row: RawInstanceRow) -> Result<TaskInstance, EngineError> {
    let (
        id_raw,
        template_raw,
        title,
        date_raw,
        start_raw,
        end_raw,
        completion_raw,
        completed_raw,
        owner_id,
        notified_raw,
    ) = row;
    let completion = CompletionState::parse(&completion_raw).ok_or_else(|| {
        EngineError::Storage(format!(
            "unknown completion state {} for instance {}",
            completion_raw, id_raw
        ))
    })?;
    Ok(TaskInstance {
        id: Uuid::parse_str(&id_raw)?,
        template_id: template_raw.map(|raw| Uuid::parse_str(&raw)).transpose()?,
        title,
        date: parse_date(&date_raw)?,
        start_time: parse_optional_datetime(start_raw.as_deref())?,
        end_time: parse_optional_datetime(end_raw.as_deref())?,
        completion,
        completed_at: parse_optional_datetime(completed_raw.as_deref())?,
        owner_id,
        notified_at: parse_optional_datetime(notified_raw.as_deref())?,
    })
}

fn encode_rule(rule: &RecurrenceRule) -> Result<String, EngineError> {
    serde_json::to_string(rule)
        .map_err(|err| EngineError::Storage(format!("rule encode failed: {}", err)))
}

fn decode_rule(raw: &str) -> Result<RecurrenceRule, EngineError> {
    serde_json::from_str(raw)
        .map_err(|err| EngineError::Storage(format!("rule decode failed: {}", err)))
}

// Datetimes are stored as canonical UTC RFC3339 ("...Z"), which keeps SQL
// range comparisons correct as plain text comparisons.
pub(crate) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, EngineError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn parse_optional_datetime(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, EngineError> {
    match raw {
        Some(raw) => Ok(Some(parse_datetime(raw)?)),
        None => Ok(None),
    }
}

pub(crate) fn format_date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn parse_date(raw: &str) -> Result<NaiveDate, EngineError> {
    Ok(NaiveDate::parse_from_str(raw, "%Y-%m-%d")?)
}

fn format_time(value: chrono::NaiveTime) -> String {
    value.format("%H:%M:%S").to_string()
}

fn parse_time(raw: &str) -> Result<chrono::NaiveTime, EngineError> {
    Ok(chrono::NaiveTime::parse_from_str(raw, "%H:%M:%S")?)
}
