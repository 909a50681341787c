//! Small display helpers.

use chrono::{DateTime, Utc};

/// Human-readable time remaining until `until`, as seen from `now`.
/// Buckets round the way a person would say it: "45m", "2h", "3d".
pub fn format_remaining(until: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (until - now).num_minutes();
    if minutes <= 0 {
        "expired".to_string()
    } else if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h", hours + 1)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d", days + 1)
        } else {
            format!("{}d", days)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_remaining() {
        let now = Utc::now();
        assert_eq!(format_remaining(now - Duration::minutes(5), now), "expired");
        assert_eq!(format_remaining(now + Duration::minutes(45), now), "45m");
        assert_eq!(format_remaining(now + Duration::minutes(90), now), "2h");
        assert_eq!(format_remaining(now + Duration::minutes(130), now), "2h");
        assert_eq!(format_remaining(now + Duration::hours(40), now), "2d");
    }
}
