use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ACTIVITY_ROW_ARITY: usize = 5;

/// One recorded foreground interval.
///
/// On the wire this is the positional row `[start, end, pid, exe, title]`
/// (epoch milliseconds for the timestamps); decoding checks the arity and the
/// type of every field instead of trusting positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "(i64, i64, i64, String, String)")]
pub struct ActivityEntry {
    pub start_ms: i64,
    pub end_ms: i64,
    pub pid: i64,
    pub exe: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("activity row has {got} fields, expected {}", ACTIVITY_ROW_ARITY)]
    Arity { got: usize },
    #[error("activity row field {index} must be {expected}")]
    Field { index: usize, expected: &'static str },
}

impl TryFrom<Vec<Value>> for ActivityEntry {
    type Error = RowError;

    fn try_from(row: Vec<Value>) -> Result<Self, Self::Error> {
        if row.len() != ACTIVITY_ROW_ARITY {
            return Err(RowError::Arity { got: row.len() });
        }
        let int = |index: usize| {
            row[index].as_i64().ok_or(RowError::Field {
                index,
                expected: "an integer",
            })
        };
        let text = |index: usize| {
            row[index]
                .as_str()
                .map(str::to_string)
                .ok_or(RowError::Field {
                    index,
                    expected: "a string",
                })
        };

        Ok(ActivityEntry {
            start_ms: int(0)?,
            end_ms: int(1)?,
            pid: int(2)?,
            exe: text(3)?,
            title: text(4)?,
        })
    }
}

impl From<ActivityEntry> for (i64, i64, i64, String, String) {
    fn from(e: ActivityEntry) -> Self {
        (e.start_ms, e.end_ms, e.pid, e.exe, e.title)
    }
}

/// Upstream pre-aggregated `[exe, durationMs]` pair. Upstream does not promise
/// one pair per executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, i64)", into = "(String, i64)")]
pub struct ExeDuration {
    pub exe: String,
    pub duration_ms: i64,
}

impl From<(String, i64)> for ExeDuration {
    fn from((exe, duration_ms): (String, i64)) -> Self {
        ExeDuration { exe, duration_ms }
    }
}

impl From<ExeDuration> for (String, i64) {
    fn from(d: ExeDuration) -> Self {
        (d.exe, d.duration_ms)
    }
}

/// Final segment of an executable path; both `\` and `/` separate segments.
pub fn basename(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_handles_both_separators() {
        assert_eq!(basename("C:\\Program Files\\Mozilla Firefox\\firefox.exe"), "firefox.exe");
        assert_eq!(basename("/usr/bin/code"), "code");
        assert_eq!(basename("C:\\msys64/usr/bin/bash.exe"), "bash.exe");
        assert_eq!(basename("plain.exe"), "plain.exe");
        assert_eq!(basename(""), "");
        assert_eq!(basename("/usr/bin/"), "");
    }

    #[test]
    fn activity_rows_decode_and_encode_positionally() {
        let rows: Vec<ActivityEntry> =
            serde_json::from_str(r#"[[0, 1000, 42, "C:\\a\\x.exe", "Inbox"]]"#).unwrap();
        assert_eq!(
            rows,
            vec![ActivityEntry {
                start_ms: 0,
                end_ms: 1000,
                pid: 42,
                exe: "C:\\a\\x.exe".to_string(),
                title: "Inbox".to_string(),
            }]
        );
        assert_eq!(
            serde_json::to_string(&rows[0]).unwrap(),
            r#"[0,1000,42,"C:\\a\\x.exe","Inbox"]"#
        );
    }

    #[test]
    fn activity_rows_with_wrong_arity_fail() {
        let err = serde_json::from_str::<ActivityEntry>(r#"[0, 1000, 42, "x.exe", "t", "extra"]"#)
            .unwrap_err();
        assert!(err.to_string().contains("6 fields"), "{err}");

        let err = serde_json::from_str::<ActivityEntry>(r#"[0, 1000, 42, "x.exe"]"#).unwrap_err();
        assert!(err.to_string().contains("4 fields"), "{err}");
    }

    #[test]
    fn activity_rows_with_wrong_types_fail() {
        let err = serde_json::from_str::<ActivityEntry>(r#"[0, "1000", 42, "x.exe", "t"]"#).unwrap_err();
        assert!(err.to_string().contains("field 1"), "{err}");
    }

    #[test]
    fn exe_durations_are_pairs() {
        let pairs: Vec<ExeDuration> = serde_json::from_str(r#"[["/bin/sh", 5], ["/bin/sh", 7]]"#).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].duration_ms, 7);
        assert_eq!(serde_json::to_string(&pairs[0]).unwrap(), r#"["/bin/sh",5]"#);
    }
}
