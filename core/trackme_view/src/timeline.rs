use serde::Serialize;

use crate::color::color_of;
use crate::model::{basename, ActivityEntry};

/// One bar of the timeline chart, colored by its executable row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineRow {
    pub exe: String,
    pub title: String,
    pub color: &'static str,
    pub start_ms: i64,
    pub end_ms: i64,
}

pub fn timeline_rows(entries: &[ActivityEntry]) -> Vec<TimelineRow> {
    entries
        .iter()
        .map(|e| {
            let exe = basename(&e.exe);
            TimelineRow {
                exe: exe.to_string(),
                title: e.title.clone(),
                color: color_of(exe),
                start_ms: e.start_ms,
                end_ms: e.end_ms,
            }
        })
        .collect()
}
