use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::types::RecurrenceRule;

/// Weekday number with 0=Sunday..6=Saturday, matching stored day-sets.
pub(crate) fn weekday_number(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Whether a rule fires on the given calendar date.
pub fn occurs_on(rule: &RecurrenceRule, date: NaiveDate) -> bool {
    match rule {
        RecurrenceRule::Daily => true,
        RecurrenceRule::Weekdays => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        RecurrenceRule::Weekly => date.weekday() == Weekday::Mon,
        RecurrenceRule::Custom { days } => days.contains(&weekday_number(date)),
    }
}

/// Next date on/after `reference` on which the rule fires.
///
/// `Custom` is the exception: it resolves to the smallest day-set member
/// strictly after the reference weekday, wrapping a full week if none is
/// greater, and falls back to the reference date when the day-set is empty.
pub fn next_occurrence(rule: &RecurrenceRule, reference: NaiveDate) -> NaiveDate {
    match rule {
        RecurrenceRule::Daily => reference,
        RecurrenceRule::Weekdays => match reference.weekday() {
            Weekday::Sat => reference + Duration::days(2),
            Weekday::Sun => reference + Duration::days(1),
            _ => reference,
        },
        RecurrenceRule::Weekly => {
            let until_monday = (7 - reference.weekday().num_days_from_monday()) % 7;
            reference + Duration::days(i64::from(until_monday))
        }
        RecurrenceRule::Custom { days } => {
            let today = weekday_number(reference);
            if let Some(&next) = days.iter().find(|&&day| day > today) {
                return reference + Duration::days(i64::from(next - today));
            }
            match days.iter().next() {
                Some(&first) => reference + Duration::days(i64::from(7 - today + first)),
                None => reference,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn custom(days: &[u8]) -> RecurrenceRule {
        RecurrenceRule::Custom {
            days: days.iter().copied().collect::<BTreeSet<u8>>(),
        }
    }

    #[test]
    fn daily_fires_every_date() {
        assert!(occurs_on(&RecurrenceRule::Daily, date(2024, 6, 1)));
        assert_eq!(
            next_occurrence(&RecurrenceRule::Daily, date(2024, 6, 1)),
            date(2024, 6, 1)
        );
    }

    #[test]
    fn weekdays_skip_weekends() {
        // 2024-06-01 is a Saturday, 2024-06-02 a Sunday.
        assert!(!occurs_on(&RecurrenceRule::Weekdays, date(2024, 6, 1)));
        assert!(!occurs_on(&RecurrenceRule::Weekdays, date(2024, 6, 2)));
        assert!(occurs_on(&RecurrenceRule::Weekdays, date(2024, 6, 3)));

        assert_eq!(
            next_occurrence(&RecurrenceRule::Weekdays, date(2024, 6, 1)),
            date(2024, 6, 3)
        );
        assert_eq!(
            next_occurrence(&RecurrenceRule::Weekdays, date(2024, 6, 2)),
            date(2024, 6, 3)
        );
        assert_eq!(
            next_occurrence(&RecurrenceRule::Weekdays, date(2024, 6, 5)),
            date(2024, 6, 5)
        );
    }

    #[test]
    fn weekdays_never_resolve_to_weekend() {
        let mut day = date(2024, 1, 1);
        for _ in 0..366 {
            let next = next_occurrence(&RecurrenceRule::Weekdays, day);
            assert!(!matches!(next.weekday(), Weekday::Sat | Weekday::Sun));
            day += Duration::days(1);
        }
    }

    #[test]
    fn weekly_resolves_to_monday() {
        // 2024-06-03 is a Monday.
        assert_eq!(
            next_occurrence(&RecurrenceRule::Weekly, date(2024, 6, 3)),
            date(2024, 6, 3)
        );
        assert_eq!(
            next_occurrence(&RecurrenceRule::Weekly, date(2024, 6, 4)),
            date(2024, 6, 10)
        );
        assert!(occurs_on(&RecurrenceRule::Weekly, date(2024, 6, 3)));
        assert!(!occurs_on(&RecurrenceRule::Weekly, date(2024, 6, 4)));
    }

    #[test]
    fn custom_advances_to_next_member() {
        // Mon/Wed/Fri set; 2024-06-06 is a Thursday.
        let rule = custom(&[1, 3, 5]);
        assert_eq!(next_occurrence(&rule, date(2024, 6, 6)), date(2024, 6, 7));
    }

    #[test]
    fn custom_wraps_past_last_member() {
        // 2024-06-07 is a Friday; next member wraps to Monday, three days on.
        let rule = custom(&[1, 3, 5]);
        assert_eq!(next_occurrence(&rule, date(2024, 6, 7)), date(2024, 6, 10));
    }

    #[test]
    fn custom_empty_set_defaults_to_reference() {
        let rule = custom(&[]);
        assert_eq!(next_occurrence(&rule, date(2024, 6, 7)), date(2024, 6, 7));
        assert!(!occurs_on(&rule, date(2024, 6, 7)));
    }

    #[test]
    fn custom_membership_includes_reference_day() {
        // occurs_on is membership, next_occurrence is strictly-after; a Friday
        // reference with Friday in the set qualifies today but resolves ahead.
        let rule = custom(&[5]);
        assert!(occurs_on(&rule, date(2024, 6, 7)));
        assert_eq!(next_occurrence(&rule, date(2024, 6, 7)), date(2024, 6, 14));
    }
}
