//! Sunday-aligned week identification.
//!
//! Every calendar week is addressed by the date of its Sunday start,
//! formatted `week-YYYY-MM-DD`. Any date inside the Sunday..Saturday
//! span derives the same key.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Deterministic identifier for a Sunday-aligned calendar week.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekKey(String);

impl WeekKey {
    /// Derive the key for the week containing `date`.
    pub fn for_date(date: NaiveDate) -> Self {
        let sunday = week_start_of(date);
        WeekKey(format!("week-{}", sunday.format("%Y-%m-%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The Sunday this key was derived from, if the key is well-formed.
    pub fn week_start(&self) -> Option<NaiveDate> {
        let date_part = self.0.strip_prefix("week-")?;
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    }
}

impl std::fmt::Display for WeekKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snap a date back to the Sunday on or before it.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_sunday() as i64;
    date - Duration::days(offset)
}

/// ISO timestamp form of a week's Sunday start (midnight UTC), as stamped
/// into `weekStart`.
pub fn week_start_iso(sunday: NaiveDate) -> String {
    format!("{}T00:00:00Z", sunday.format("%Y-%m-%d"))
}
