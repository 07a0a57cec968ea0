//! Materializes concrete task instances from recurrence templates.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::recurrence::occurs_on;
use crate::store::InstanceStore;
use crate::types::{CompletionState, EngineError, TaskInstance, TaskTemplate};

/// Expand a template over `[start, end]`, creating one instance per
/// qualifying date that does not already have one.
///
/// Re-running over an overlapping range is a no-op for already-materialized
/// dates. The whole batch persists in one store transaction: a write failure
/// fails the call with nothing created, and the caller may retry the range.
pub fn expand(
    template: &TaskTemplate,
    start: NaiveDate,
    end: NaiveDate,
    tz: Tz,
    store: &dyn InstanceStore,
) -> Result<Vec<TaskInstance>, EngineError> {
    if start > end {
        return Err(EngineError::InvalidDateRange { start, end });
    }

    let existing = store.existing_dates(template.id, start, end)?;
    let mut created = Vec::new();
    let mut date = start;
    while date <= end {
        if occurs_on(&template.rule, date) && !existing.contains(&date) {
            created.push(materialize(template, date, tz));
        }
        date += Duration::days(1);
    }

    if !created.is_empty() {
        store.insert_instances(&created)?;
    }
    Ok(created)
}

fn materialize(template: &TaskTemplate, date: NaiveDate, tz: Tz) -> TaskInstance {
    let (start_time, end_time) = match template.time_of_day {
        Some(tod) => (
            local_instant(date, tod.start, tz),
            local_instant(date, tod.end, tz),
        ),
        None => (None, None),
    };
    TaskInstance {
        id: Uuid::new_v4(),
        template_id: Some(template.id),
        title: template.title.clone(),
        date,
        start_time,
        end_time,
        completion: CompletionState::Pending,
        completed_at: None,
        owner_id: template.owner_id.clone(),
        notified_at: None,
    }
}

/// Project a local wall time on a calendar date to a UTC instant.
///
/// A wall time falling in a DST gap has no instant; the block stays untimed
/// rather than guessing one.
fn local_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}
