use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Recurrence definition for a task template.
///
/// Weekday numbers follow the 0=Sunday..6=Saturday convention used by the
/// stored day-sets, so `Custom { days: [1, 3, 5] }` is Mon/Wed/Fri.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceRule {
    Daily,
    Weekdays,
    /// Fires on a fixed weekday (Monday).
    Weekly,
    Custom { days: BTreeSet<u8> },
}

/// Fixed daily wall time carried by scheduled time blocks.
///
/// Plain recurring to-dos have no time of day; their instances are untimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: Uuid,
    pub title: String,
    pub rule: RecurrenceRule,
    pub goal_id: Option<Uuid>,
    pub owner_id: String,
    #[serde(default)]
    pub time_of_day: Option<TimeOfDay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Pending,
    Completed,
    Skipped,
    Failed,
}

impl CompletionState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CompletionState::Pending => "pending",
            CompletionState::Completed => "completed",
            CompletionState::Skipped => "skipped",
            CompletionState::Failed => "failed",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(CompletionState::Pending),
            "completed" => Some(CompletionState::Completed),
            "skipped" => Some(CompletionState::Skipped),
            "failed" => Some(CompletionState::Failed),
            _ => None,
        }
    }
}

/// One concrete, dated occurrence of a task.
///
/// `template_id` is `None` for one-off tasks. `date` is the owner's local
/// calendar date; `start_time`/`end_time` are UTC instants. At most one
/// instance exists per `(template_id, date)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    pub title: String,
    pub date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub completion: CompletionState,
    pub completed_at: Option<DateTime<Utc>>,
    pub owner_id: String,
    /// Stamped after the first successful send so overlapping dispatch runs
    /// do not notify the same instance twice.
    pub notified_at: Option<DateTime<Utc>>,
}

/// A registered push endpoint belonging to one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: Uuid,
    pub owner_id: String,
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("uuid parse error: {0}")]
    UuidParse(#[from] uuid::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),
    #[error("invalid date range: {start} > {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}
