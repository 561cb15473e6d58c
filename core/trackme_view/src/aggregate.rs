use std::collections::HashMap;

use serde::Serialize;

use crate::format::format_duration;
use crate::model::{basename, ActivityEntry, ExeDuration};

/// Anything that contributes a duration to an executable.
pub trait Timed {
    fn exe_path(&self) -> &str;
    fn duration_ms(&self) -> i64;
}

impl Timed for ActivityEntry {
    fn exe_path(&self) -> &str {
        &self.exe
    }

    // Not clamped: a record with `end < start` subtracts from its group.
    fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

impl Timed for ExeDuration {
    fn exe_path(&self) -> &str {
        &self.exe
    }

    fn duration_ms(&self) -> i64 {
        self.duration_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedTotal {
    pub name: String,
    pub total_ms: i64,
    pub tooltip: String,
}

/// Sums durations per executable basename, largest total first.
///
/// Groups keep the order in which their basename first appeared, so equal
/// totals come out in input order.
pub fn aggregate<T: Timed>(items: &[T]) -> Vec<AggregatedTotal> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, i64)> = Vec::new();

    for item in items {
        let name = basename(item.exe_path());
        match index.get(name) {
            Some(&i) => groups[i].1 += item.duration_ms(),
            None => {
                index.insert(name, groups.len());
                groups.push((name, item.duration_ms()));
            }
        }
    }

    // stable
    groups.sort_by(|a, b| b.1.cmp(&a.1));
    groups
        .into_iter()
        .map(|(name, total_ms)| AggregatedTotal {
            name: name.to_string(),
            total_ms,
            tooltip: format!("{name} - {}", format_duration(total_ms)),
        })
        .collect()
}

/// What a pie view needs: the slices plus a headline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PieSummary {
    pub totals: Vec<AggregatedTotal>,
    pub total_ms: i64,
    pub title: String,
}

impl PieSummary {
    pub fn build<T: Timed>(items: &[T]) -> Self {
        let totals = aggregate(items);
        let total_ms = totals.iter().map(|t| t.total_ms).sum();
        PieSummary {
            totals,
            total_ms,
            title: format!("Total {}", format_duration(total_ms)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}
