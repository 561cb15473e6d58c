use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use serde::Serialize;

use crate::error::InvalidRangeError;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// A user selection. Replaced wholesale on every pick, never mutated.
#[derive(Debug, Clone)]
pub struct DateRange<Tz: TimeZone> {
    pub from: DateTime<Tz>,
    pub to: DateTime<Tz>,
}

impl<Tz: TimeZone> PartialEq for DateRange<Tz> {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.to == other.to
    }
}

impl<Tz: TimeZone> DateRange<Tz> {
    pub fn new(from: DateTime<Tz>, to: DateTime<Tz>) -> Self {
        DateRange { from, to }
    }

    /// A range covering the single day containing `at`.
    pub fn day(at: DateTime<Tz>) -> Self {
        DateRange {
            from: at.clone(),
            to: at,
        }
    }

    /// Builds a range from raw epoch-millisecond endpoints, as a picker or a
    /// bridge request would hand them over.
    pub fn from_millis(
        from: Option<i64>,
        to: Option<i64>,
        tz: &Tz,
    ) -> Result<Self, InvalidRangeError> {
        let at = |end: &'static str, ms: Option<i64>| {
            let ms = ms.ok_or(InvalidRangeError::Missing(end))?;
            tz.timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| InvalidRangeError::Unparseable {
                    end,
                    value: ms.to_string(),
                })
        };
        Ok(DateRange {
            from: at("from", from)?,
            to: at("to", to)?,
        })
    }

    /// Builds a range from text endpoints. Each end is either `YYYY-MM-DD`
    /// (taken as local midnight in `tz`) or an RFC 3339 timestamp.
    pub fn parse(from: Option<&str>, to: Option<&str>, tz: &Tz) -> Result<Self, InvalidRangeError> {
        let from = parse_endpoint("from", from, tz)?;
        let to = parse_endpoint("to", to, tz)?;
        Ok(DateRange { from, to })
    }

    /// Whole calendar days between `from` and `to`; 0 for a single-day pick.
    pub fn span_days(&self) -> i64 {
        days_between(&self.from, &self.to)
    }
}

fn parse_endpoint<Tz: TimeZone>(
    end: &'static str,
    value: Option<&str>,
    tz: &Tz,
) -> Result<DateTime<Tz>, InvalidRangeError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(InvalidRangeError::Missing(end))?;

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return start_of_day(date, tz);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(tz))
        .map_err(|_| InvalidRangeError::Unparseable {
            end,
            value: value.to_string(),
        })
}

/// Upstream query boundaries, epoch milliseconds, `from` inclusive and `to`
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct QueryRange {
    #[serde(rename = "from")]
    pub from_ms: i64,
    #[serde(rename = "to")]
    pub to_ms: i64,
}

/// Start of `from`'s calendar day up to the start of the day after `to`'s,
/// half-open, in epoch milliseconds.
pub fn normalize<Tz: TimeZone>(range: &DateRange<Tz>) -> Result<QueryRange, InvalidRangeError> {
    if range.from > range.to {
        return Err(InvalidRangeError::Reversed {
            from_ms: range.from.timestamp_millis(),
            to_ms: range.to.timestamp_millis(),
        });
    }

    let tz = range.from.timezone();
    let last_day = range.to.date_naive();
    let after_last = last_day
        .succ_opt()
        .ok_or(InvalidRangeError::OutOfRange(last_day))?;

    let from = start_of_day(range.from.date_naive(), &tz)?;
    let to = start_of_day(after_last, &tz)?;
    Ok(QueryRange {
        from_ms: from.timestamp_millis(),
        to_ms: to.timestamp_millis(),
    })
}

/// Local midnight of `date`. Where midnight is ambiguous the earlier instant
/// wins; where it falls into a gap there is no answer.
pub fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Result<DateTime<Tz>, InvalidRangeError> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .ok_or(InvalidRangeError::NoMidnight(date))
}

pub fn days_between<Tz: TimeZone>(from: &DateTime<Tz>, to: &DateTime<Tz>) -> i64 {
    to.date_naive()
        .signed_duration_since(from.date_naive())
        .num_days()
}
