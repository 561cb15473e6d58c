/// Compact rendering of a millisecond duration, e.g. `"2h 5m 3s"`.
///
/// Zero components are left out and the sub-second remainder is dropped.
pub fn format_duration(ms: i64) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let mut secs = ms.unsigned_abs() / 1000;
    if secs == 0 {
        return "0s".to_string();
    }

    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3_600;
    secs %= 3_600;
    let minutes = secs / 60;
    secs %= 60;

    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m"), (secs, "s")]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect();
    format!("{sign}{}", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_works() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(999), "0s");
        assert_eq!(format_duration(1_500), "1s");
        assert_eq!(format_duration(60_000), "1m");
        assert_eq!(format_duration(2 * 3_600_000 + 5 * 60_000 + 3_000), "2h 5m 3s");
        assert_eq!(format_duration(3_600_000 + 7_000), "1h 7s");
        assert_eq!(format_duration(26 * 3_600_000), "1d 2h");
        assert_eq!(format_duration(-90_000), "-1m 30s");
    }
}
