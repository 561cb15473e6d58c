use chrono::{DateTime, Days, TimeZone};

use crate::range::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub days: u32,
    pub label: &'static str,
}

/// Shortest first.
pub const WINDOWS: [Window; 8] = [
    Window { days: 3, label: "Last 3 days" },
    Window { days: 7, label: "Last week" },
    Window { days: 14, label: "Last 2 weeks" },
    Window { days: 30, label: "Last month" },
    Window { days: 60, label: "Last 2 months" },
    Window { days: 90, label: "Last 3 months" },
    Window { days: 180, label: "Last half of year" },
    Window { days: 365, label: "Last year" },
];

/// A window ending where the total range ends.
#[derive(Debug, Clone)]
pub struct SubRange<Tz: TimeZone> {
    pub from: DateTime<Tz>,
    pub to: DateTime<Tz>,
    pub label: &'static str,
    pub days: u32,
}

impl<Tz: TimeZone> SubRange<Tz> {
    pub fn range(&self) -> DateRange<Tz> {
        DateRange::new(self.from.clone(), self.to.clone())
    }
}

/// Every catalog window that fits inside `total`, shortest first.
///
/// A single-day `total` yields nothing; callers pick [`Layout::SingleDay`]
/// for it instead.
pub fn decompose<Tz: TimeZone>(total: &DateRange<Tz>) -> Vec<SubRange<Tz>> {
    let span = total.span_days();
    WINDOWS
        .iter()
        .filter(|w| i64::from(w.days) <= span)
        .filter_map(|w| {
            let from = total.to.clone().checked_sub_days(Days::new(u64::from(w.days)))?;
            Some(SubRange {
                from,
                to: total.to.clone(),
                label: w.label,
                days: w.days,
            })
        })
        .collect()
}

/// How the explorer lays out a selection.
#[derive(Debug, Clone)]
pub enum Layout<Tz: TimeZone> {
    /// One day: timeline of that day.
    SingleDay,
    /// Several days: one pie per trailing window.
    MultiDay(Vec<SubRange<Tz>>),
}

impl<Tz: TimeZone> Layout<Tz> {
    pub fn for_range(range: &DateRange<Tz>) -> Self {
        if range.span_days() == 0 {
            Layout::SingleDay
        } else {
            Layout::MultiDay(decompose(range))
        }
    }
}
