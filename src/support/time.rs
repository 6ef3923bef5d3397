use chrono::{DateTime, Duration, Timelike, Utc};

/// Rounds to the nearest minute; 30 seconds or more rounds up. Vote
/// deadlines land on whole minutes so the announced end time reads cleanly.
pub fn round_to_minute(date: DateTime<Utc>) -> DateTime<Utc> {
    let discard = Duration::seconds(date.second() as i64)
        + Duration::nanoseconds(date.nanosecond() as i64);

    let mut result = date - discard;
    if discard >= Duration::seconds(30) {
        result = result + Duration::seconds(60);
    }
    result
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn rounds_down_below_thirty_seconds() {
        let date = Utc.ymd(2023, 5, 1).and_hms_nano(10, 4, 29, 999_999_999);
        assert_eq!(round_to_minute(date), Utc.ymd(2023, 5, 1).and_hms(10, 4, 0));
    }

    #[test]
    fn rounds_up_from_thirty_seconds() {
        let date = Utc.ymd(2023, 5, 1).and_hms(10, 4, 30);
        assert_eq!(round_to_minute(date), Utc.ymd(2023, 5, 1).and_hms(10, 5, 0));
    }

    #[test]
    fn whole_minutes_are_untouched() {
        let date = Utc.ymd(2023, 5, 1).and_hms(10, 4, 0);
        assert_eq!(round_to_minute(date), date);
    }
}
