//! Human-readable formatting for the hospital list.

use chrono::{DateTime, Utc};

/// Distance as shown next to a hospital, e.g. `"450m"` or `"2.3km"`.
pub fn format_distance(meters: f64) -> String {
    if meters < 100.0 {
        format!("{}m", meters.round())
    } else if meters < 1000.0 {
        format!("{}m", (meters / 10.0).round() * 10.0)
    } else if meters < 10_000.0 {
        format!("{:.1}km", meters / 1000.0)
    } else {
        format!("{}km", (meters / 1000.0).round())
    }
}

/// Relative age of the hospital data, e.g. `"3 minutes ago"`.
pub fn format_time_ago(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(last_updated) = last_updated else {
        return "Never".to_string();
    };

    let seconds = (now - last_updated).num_seconds();
    let units = [
        (31_536_000, "year"),
        (2_592_000, "month"),
        (86_400, "day"),
        (3_600, "hour"),
        (60, "minute"),
    ];

    for (size, unit) in units {
        let count = seconds / size;
        if count >= 1 {
            let plural = if count == 1 { "" } else { "s" };
            return format!("{count} {unit}{plural} ago");
        }
    }

    "Just now".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_distance_bands() {
        assert_eq!(format_distance(42.4), "42m");
        assert_eq!(format_distance(99.6), "100m");
        assert_eq!(format_distance(454.0), "450m");
        assert_eq!(format_distance(996.0), "1000m");
        assert_eq!(format_distance(1234.0), "1.2km");
        assert_eq!(format_distance(9_949.0), "9.9km");
        assert_eq!(format_distance(12_600.0), "13km");
    }

    #[test]
    fn test_format_time_ago_never() {
        assert_eq!(format_time_ago(None, Utc::now()), "Never");
    }

    #[test]
    fn test_format_time_ago_units() {
        let now = Utc::now();
        let ago = |d: Duration| format_time_ago(Some(now - d), now);

        assert_eq!(ago(Duration::seconds(30)), "Just now");
        assert_eq!(ago(Duration::seconds(60)), "1 minute ago");
        assert_eq!(ago(Duration::minutes(45)), "45 minutes ago");
        assert_eq!(ago(Duration::hours(1)), "1 hour ago");
        assert_eq!(ago(Duration::days(3)), "3 days ago");
        assert_eq!(ago(Duration::days(31)), "1 month ago");
        assert_eq!(ago(Duration::days(800)), "2 years ago");
    }

    #[test]
    fn test_future_timestamp_is_just_now() {
        let now = Utc::now();
        assert_eq!(
            format_time_ago(Some(now + Duration::minutes(5)), now),
            "Just now"
        );
    }
}
