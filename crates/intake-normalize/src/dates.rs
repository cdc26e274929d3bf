// SPDX-License-Identifier: MIT OR Apache-2.0
//! Relative due-date resolution.
//!
//! Recognised labels (case-insensitive, trimmed): `today`, `tomorrow`,
//! `next week`, `next week monday`, `next <weekday>`, and a bare
//! `<weekday>`. Bare and `next`-prefixed weekdays both mean the *strictly*
//! next occurrence: a label naming today's weekday resolves seven days out.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;

/// A recognised relative label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelativeLabel {
    /// The current date in the user's timezone.
    Today,
    /// One day out.
    Tomorrow,
    /// Monday of the following ISO week (`next week`, `next week monday`).
    NextWeekMonday,
    /// Strictly next occurrence of a weekday (`friday`, `next friday`).
    NextWeekday(Weekday),
}

/// Parse a relative label, or `None` if the text is not one.
pub fn parse_relative_label(value: &str) -> Option<RelativeLabel> {
    let lowered = value.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "today" => return Some(RelativeLabel::Today),
        "tomorrow" => return Some(RelativeLabel::Tomorrow),
        "next week" | "next week monday" => return Some(RelativeLabel::NextWeekMonday),
        _ => {}
    }
    let name = lowered.strip_prefix("next ").unwrap_or(&lowered);
    parse_weekday(name).map(RelativeLabel::NextWeekday)
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Resolve a label against `today`.
pub fn resolve_relative(label: RelativeLabel, today: NaiveDate) -> NaiveDate {
    match label {
        RelativeLabel::Today => today,
        RelativeLabel::Tomorrow => today + Duration::days(1),
        RelativeLabel::NextWeekMonday => {
            let days = 7 - i64::from(today.weekday().num_days_from_monday());
            today + Duration::days(days)
        }
        RelativeLabel::NextWeekday(target) => {
            let delta = (i64::from(target.num_days_from_monday())
                - i64::from(today.weekday().num_days_from_monday()))
            .rem_euclid(7);
            let delta = if delta == 0 { 7 } else { delta };
            today + Duration::days(delta)
        }
    }
}

/// True if the value parses as an ISO-8601 date or datetime.
pub fn is_iso_date_or_datetime(value: &str) -> bool {
    value.parse::<NaiveDate>().is_ok()
        || value.parse::<NaiveDateTime>().is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
}

/// Outcome of interpreting a due value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DueResolution {
    /// A relative label was resolved to an absolute date.
    Resolved {
        /// The caller's original label.
        source: String,
        /// The resolved ISO date.
        date: String,
    },
    /// The value was already an ISO date or datetime.
    AlreadyAbsolute,
    /// Not a label and not ISO; a clarification is needed.
    Unrecognised,
}

/// Interpret a due value against the current instant in `tz`.
pub fn resolve_due(value: &str, now: DateTime<Utc>, tz: Tz) -> DueResolution {
    if let Some(label) = parse_relative_label(value) {
        let today = now.with_timezone(&tz).date_naive();
        return DueResolution::Resolved {
            source: value.trim().to_string(),
            date: resolve_relative(label, today).to_string(),
        };
    }
    if is_iso_date_or_datetime(value) {
        DueResolution::AlreadyAbsolute
    } else {
        DueResolution::Unrecognised
    }
}
