use chrono::{DateTime, Utc};

const MINUTES_IN_DAY: i64 = 1440;
const MINUTES_IN_MONTH: i64 = 43200;

/// Human distance between `then` and `now`, e.g. "about 2 hours".
///
/// Buckets follow the usual "time ago" phrasing: under 30s is "less than a
/// minute", minutes up to 44, hours up to a day, days up to a month, then
/// months and years. Times in the future count as zero.
pub fn distance(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0);
    let minutes = (seconds as f64 / 60.0).round() as i64;

    if minutes < 2 {
        return if minutes == 0 {
            "less than a minute".to_string()
        } else {
            "1 minute".to_string()
        };
    }
    if minutes < 45 {
        return format!("{} minutes", minutes);
    }
    if minutes < 90 {
        return "about 1 hour".to_string();
    }
    if minutes < MINUTES_IN_DAY {
        let hours = (minutes as f64 / 60.0).round() as i64;
        return format!("about {} hours", hours);
    }
    if minutes < 2520 {
        return "1 day".to_string();
    }
    if minutes < MINUTES_IN_MONTH {
        let days = (minutes as f64 / MINUTES_IN_DAY as f64).round() as i64;
        return format!("{} days", days);
    }
    if minutes < 2 * MINUTES_IN_MONTH {
        let months = (minutes as f64 / MINUTES_IN_MONTH as f64).round() as i64;
        return plural("about", months, "month");
    }

    let months = minutes / MINUTES_IN_MONTH;
    if months < 12 {
        let months = (minutes as f64 / MINUTES_IN_MONTH as f64).round() as i64;
        return format!("{} months", months);
    }

    let years = months / 12;
    match months % 12 {
        0..3 => plural("about", years, "year"),
        3..9 => plural("over", years, "year"),
        _ => format!("almost {} years", years + 1),
    }
}

/// `distance` from now, with an "ago" suffix.
pub fn relative_time(then: DateTime<Utc>) -> String {
    format!("{} ago", distance(then, Utc::now()))
}

fn plural(qualifier: &str, n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{} 1 {}", qualifier, unit)
    } else {
        format!("{} {} {}s", qualifier, n, unit)
    }
}

/// Shorten an id for table output.
///
/// Ids are UUIDv7, whose leading characters encode the creation time and are
/// shared by everything made within the same minute. The trailing characters
/// are random, so the short form keeps those.
pub fn short_id(id: &str) -> &str {
    let start = id.len().saturating_sub(SHORT_ID_LEN);
    id.get(start..).unwrap_or(id)
}

pub const SHORT_ID_LEN: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ago(d: Duration) -> String {
        let now = Utc::now();
        distance(now - d, now)
    }

    #[test]
    fn seconds_and_minutes() {
        assert_eq!(ago(Duration::seconds(0)), "less than a minute");
        assert_eq!(ago(Duration::seconds(29)), "less than a minute");
        assert_eq!(ago(Duration::seconds(45)), "1 minute");
        assert_eq!(ago(Duration::minutes(5)), "5 minutes");
        assert_eq!(ago(Duration::minutes(44)), "44 minutes");
    }

    #[test]
    fn hours_and_days() {
        assert_eq!(ago(Duration::minutes(50)), "about 1 hour");
        assert_eq!(ago(Duration::hours(3)), "about 3 hours");
        assert_eq!(ago(Duration::hours(30)), "1 day");
        assert_eq!(ago(Duration::days(5)), "5 days");
    }

    #[test]
    fn months_and_years() {
        assert_eq!(ago(Duration::days(35)), "about 1 month");
        assert_eq!(ago(Duration::days(100)), "3 months");
        assert_eq!(ago(Duration::days(370)), "about 1 year");
        assert_eq!(ago(Duration::days(365 + 180)), "over 1 year");
        assert_eq!(ago(Duration::days(365 + 330)), "almost 2 years");
        assert_eq!(ago(Duration::days(3 * 365 + 20)), "about 3 years");
    }

    #[test]
    fn future_counts_as_now() {
        let now = Utc::now();
        assert_eq!(distance(now + Duration::minutes(10), now), "less than a minute");
    }

    #[test]
    fn relative_time_has_suffix() {
        assert_eq!(relative_time(Utc::now()), "less than a minute ago");
    }

    #[test]
    fn short_id_keeps_random_tail() {
        assert_eq!(
            short_id("01a14fdf-24b9-750f-8a74-5f65c03ad7fc"),
            "c03ad7fc"
        );
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn short_ids_differ_for_back_to_back_conversations() {
        let mut store = tutor_chat::ChatStore::in_memory();
        let a = store.create_conversation("Algebra", "math").unwrap();
        let b = store.create_conversation("Optics", "physics").unwrap();
        assert_eq!(short_id(&a).len(), SHORT_ID_LEN);
        assert_ne!(short_id(&a), short_id(&b));
    }
}
