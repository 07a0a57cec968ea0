use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// The query bounds for one dispatch cycle.
///
/// Instance `date` columns hold local calendar dates while `start_time` holds
/// UTC instants, so a due query must filter on both: local-date equality and
/// UTC instant range. Filtering by the UTC date alone misreads events near
/// local midnight (a 9pm US-Eastern start is already the next UTC day).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueWindow {
    /// "Today" in the owner's timezone, never the UTC date.
    pub local_date: NaiveDate,
    /// Inclusive lower bound: `now - back_buffer`, absorbing scheduler jitter.
    pub start_utc: DateTime<Utc>,
    /// Exclusive upper bound: `now + lookahead`.
    pub end_utc: DateTime<Utc>,
}

impl DueWindow {
    /// This is the single place local calendar dates are derived; call sites
    /// must never inline their own "today" arithmetic.
    pub fn compute(now: DateTime<Utc>, tz: Tz, back_buffer: Duration, lookahead: Duration) -> Self {
        Self {
            local_date: now.with_timezone(&tz).date_naive(),
            start_utc: now - back_buffer,
            end_utc: now + lookahead,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start_utc && instant < self.end_utc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("valid rfc3339")
            .with_timezone(&Utc)
    }

    fn window_at(now: &str, tz: &str) -> DueWindow {
        DueWindow::compute(
            utc(now),
            Tz::from_str(tz).expect("valid zone"),
            Duration::minutes(5),
            Duration::minutes(60),
        )
    }

    #[test]
    fn back_buffer_bounds_are_tight() {
        let window = window_at("2024-06-01T13:03:00Z", "UTC");
        // Started 4 minutes ago: still inside the buffer.
        assert!(window.contains(utc("2024-06-01T12:59:00Z")));
        // Started 6 minutes ago: missed for good.
        assert!(!window.contains(utc("2024-06-01T12:57:00Z")));
    }

    #[test]
    fn lookahead_end_is_exclusive() {
        let window = window_at("2024-06-01T13:00:00Z", "UTC");
        assert!(window.contains(utc("2024-06-01T13:59:59Z")));
        assert!(!window.contains(utc("2024-06-01T14:00:00Z")));
    }

    #[test]
    fn local_date_crosses_utc_midnight() {
        // 01:00 UTC on June 2 is still 9pm June 1 in New York.
        let window = window_at("2024-06-02T01:00:00Z", "America/New_York");
        assert_eq!(
            window.local_date,
            NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
        );

        let utc_window = window_at("2024-06-02T01:00:00Z", "UTC");
        assert_eq!(
            utc_window.local_date,
            NaiveDate::from_ymd_opt(2024, 6, 2).expect("valid date")
        );
    }
}
