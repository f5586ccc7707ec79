use chrono::{DateTime, Duration, Local, NaiveDate, Utc};

/// This is the standard way of converting a date to a string in backtowork.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Seconds between two moments, never negative. Clock adjustments backwards count as zero.
pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let elapsed = later - earlier;
    if elapsed <= Duration::zero() {
        0.
    } else {
        elapsed.num_milliseconds() as f64 / 1000.
    }
}

/// Human readable duration, e.g. `1h 05m` or `42s`.
pub fn format_seconds(seconds: f64) -> String {
    let total = seconds.max(0.).round() as u64;
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

pub fn to_local_string(moment: DateTime<Utc>) -> String {
    moment
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{date_key, format_seconds, seconds_between};

    #[test]
    fn test_date_key() {
        assert_eq!(
            date_key(NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()),
            "2025-03-07"
        );
    }

    #[test]
    fn test_seconds_between_is_never_negative() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(seconds_between(start, start + Duration::milliseconds(1500)), 1.5);
        assert_eq!(seconds_between(start, start - Duration::seconds(3)), 0.);
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(42.), "42s");
        assert_eq!(format_seconds(65.), "1m 05s");
        assert_eq!(format_seconds(3900.), "1h 05m");
    }
}
