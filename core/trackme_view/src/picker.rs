use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use tracing::info;

use crate::error::FetchError;
use crate::range::{start_of_day, DateRange};
use crate::source::DataSource;

/// Range after the calendar reports a pick.
///
/// A lone `from` selects that day. An empty pick happens when the first day
/// of the current range is clicked again and collapses the range onto it.
pub fn apply_pick<Tz: TimeZone>(
    current: &DateRange<Tz>,
    from: Option<DateTime<Tz>>,
    to: Option<DateTime<Tz>>,
) -> DateRange<Tz> {
    match (from, to) {
        (Some(from), Some(to)) => DateRange::new(from, to),
        (Some(from), None) => DateRange::day(from),
        (None, _) => DateRange::day(current.from.clone()),
    }
}

pub fn footer<Tz: TimeZone>(range: Option<&DateRange<Tz>>) -> String {
    let Some(range) = range else {
        return "Please pick the first day.".to_string();
    };
    let from = range.from.date_naive();
    let to = range.to.date_naive();
    if from == to {
        long_date(from)
    } else {
        format!("{}–{}", long_date(from), long_date(to))
    }
}

/// `October 19th, 2026`
pub fn long_date(date: NaiveDate) -> String {
    let day = date.day();
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{} {day}{suffix}, {}", date.format("%B"), date.year())
}

/// Days that have any recorded activity, owned by whoever shows the picker.
///
/// Loaded on first use and again whenever the calendar day changes (a new day
/// may have become active) or on `refresh`.
#[derive(Debug, Default)]
pub struct ActiveDates {
    days: Option<BTreeSet<i64>>,
    loaded_on: Option<NaiveDate>,
}

impl ActiveDates {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure_loaded<S: DataSource>(
        &mut self,
        source: &S,
        today: NaiveDate,
    ) -> Result<(), FetchError> {
        if self.days.is_some() && self.loaded_on == Some(today) {
            return Ok(());
        }
        self.refresh(source, today).await
    }

    /// Reloads unconditionally. On failure the previous set stays.
    pub async fn refresh<S: DataSource>(&mut self, source: &S, today: NaiveDate) -> Result<(), FetchError> {
        let days = source.list_active_dates().await?;
        info!("{} days active", days.len());
        self.days = Some(days);
        self.loaded_on = Some(today);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.days.is_some()
    }

    /// Until the set is loaded every day is selectable.
    pub fn is_selectable(&self, day_start_ms: i64) -> bool {
        self.days
            .as_ref()
            .map_or(true, |days| days.contains(&day_start_ms))
    }

    pub fn is_day_selectable<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> bool {
        match start_of_day(date, tz) {
            Ok(start) => self.is_selectable(start.timestamp_millis()),
            Err(_) => false,
        }
    }
}
