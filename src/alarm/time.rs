//! Minute-granularity time helpers for alarms.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use super::error::AlarmError;

/// Drops seconds and sub-seconds.
#[must_use]
pub fn truncate_to_minute(time: NaiveDateTime) -> NaiveDateTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// Returns true if both times fall in the same calendar minute.
#[must_use]
pub fn same_minute(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    truncate_to_minute(a) == truncate_to_minute(b)
}

/// `now` plus `minutes`, seconds preserved.
#[must_use]
pub fn snooze_time(now: NaiveDateTime, minutes: u32) -> NaiveDateTime {
    now + Duration::minutes(i64::from(minutes))
}

/// Builds a wall-clock time of day.
///
/// # Errors
///
/// Returns `AlarmError::InvalidTime` if `hour > 23` or `minute > 59`.
pub fn time_of_day(hour: u32, minute: u32) -> Result<NaiveTime, AlarmError> {
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or(AlarmError::InvalidTime { hour, minute })
}

/// The next `hour:minute` strictly after `now`: today if still ahead,
/// otherwise tomorrow.
///
/// # Errors
///
/// Returns `AlarmError::InvalidTime` for an out-of-range time.
pub fn next_occurrence(
    now: NaiveDateTime,
    hour: u32,
    minute: u32,
) -> Result<NaiveDateTime, AlarmError> {
    let today = now.date().and_time(time_of_day(hour, minute)?);
    if today <= now {
        Ok(today + Duration::days(1))
    } else {
        Ok(today)
    }
}

/// Parses `HH:MM` (24-hour).
///
/// # Errors
///
/// Returns `AlarmError::ParseTime` for malformed input and
/// `AlarmError::InvalidTime` for out-of-range values.
pub fn parse_hm(input: &str) -> Result<(u32, u32), AlarmError> {
    let parse_err = || AlarmError::ParseTime(input.to_string());
    let (h, m) = input.trim().split_once(':').ok_or_else(parse_err)?;
    if m.len() != 2 {
        return Err(parse_err());
    }
    let hour: u32 = h.parse().map_err(|_| parse_err())?;
    let minute: u32 = m.parse().map_err(|_| parse_err())?;
    time_of_day(hour, minute)?;
    Ok((hour, minute))
}

/// Formats an alarm time relative to `now`: "Today 07:30",
/// "Tomorrow 07:30", or "MM-DD 07:30".
#[must_use]
pub fn format_alarm_time(time: NaiveDateTime, now: NaiveDateTime) -> String {
    let today = now.date();
    let date = time.date();
    let hm = time.format("%H:%M");

    if date == today {
        format!("Today {}", hm)
    } else if Some(date) == today.succ_opt() {
        format!("Tomorrow {}", hm)
    } else {
        format!("{} {}", date.format("%m-%d"), hm)
    }
}

/// Time remaining until `time`, rounded up to whole minutes: "in 2h 30m".
#[must_use]
pub fn time_until(time: NaiveDateTime, now: NaiveDateTime) -> String {
    let diff_ms = (time - now).num_milliseconds();
    if diff_ms <= 0 {
        return "overdue".to_string();
    }

    let total_minutes = (diff_ms + 59_999) / 60_000;
    let (days, hours, minutes) = (
        total_minutes / (24 * 60),
        (total_minutes % (24 * 60)) / 60,
        total_minutes % 60,
    );
    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m")]
        .into_iter()
        .filter(|&(n, _)| n > 0)
        .map(|(n, unit)| format!("{}{}", n, unit))
        .collect();
    format!("in {}", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_milli_opt(h, m, s, 0)
            .unwrap()
    }

    mod matching_tests {
        use super::*;

        #[test]
        fn test_same_minute_window() {
            let alarm = t(8, 0, 0);
            assert!(same_minute(alarm, t(8, 0, 0)));
            assert!(same_minute(
                alarm,
                t(8, 0, 59) + Duration::milliseconds(999)
            ));
            assert!(!same_minute(alarm, t(7, 59, 59)));
            assert!(!same_minute(alarm, t(8, 1, 0)));
        }

        #[test]
        fn test_same_minute_ignores_alarm_seconds() {
            assert!(same_minute(t(8, 10, 30), t(8, 10, 5)));
        }

        #[test]
        fn test_same_minute_compares_dates() {
            assert!(!same_minute(t(8, 0, 0), t(8, 0, 0) + Duration::days(1)));
        }
    }

    mod creation_tests {
        use super::*;

        #[test]
        fn test_snooze_time_keeps_seconds() {
            assert_eq!(snooze_time(t(8, 0, 30), 10), t(8, 10, 30));
        }

        #[test]
        fn test_next_occurrence_rolls_forward() {
            assert_eq!(
                next_occurrence(t(8, 0, 0), 7, 0).unwrap(),
                t(7, 0, 0) + Duration::days(1)
            );
            assert_eq!(next_occurrence(t(6, 0, 0), 7, 0).unwrap(), t(7, 0, 0));
        }

        #[test]
        fn test_next_occurrence_same_minute_is_tomorrow() {
            assert_eq!(
                next_occurrence(t(7, 0, 0), 7, 0).unwrap(),
                t(7, 0, 0) + Duration::days(1)
            );
        }

        #[test]
        fn test_next_occurrence_rejects_invalid() {
            assert_eq!(
                next_occurrence(t(6, 0, 0), 24, 0),
                Err(AlarmError::InvalidTime { hour: 24, minute: 0 })
            );
        }

        #[test]
        fn test_parse_hm() {
            assert_eq!(parse_hm("07:30").unwrap(), (7, 30));
            assert_eq!(parse_hm(" 23:59 ").unwrap(), (23, 59));
            assert!(matches!(parse_hm("7"), Err(AlarmError::ParseTime(_))));
            assert!(matches!(parse_hm("7:5"), Err(AlarmError::ParseTime(_))));
            assert!(matches!(
                parse_hm("24:00"),
                Err(AlarmError::InvalidTime { .. })
            ));
        }
    }

    mod display_tests {
        use super::*;

        #[test]
        fn test_format_alarm_time() {
            let now = t(8, 0, 0);
            assert_eq!(format_alarm_time(t(9, 15, 0), now), "Today 09:15");
            assert_eq!(
                format_alarm_time(t(6, 0, 0) + Duration::days(1), now),
                "Tomorrow 06:00"
            );
            assert_eq!(
                format_alarm_time(t(6, 0, 0) + Duration::days(3), now),
                "01-04 06:00"
            );
        }

        #[test]
        fn test_time_until() {
            let now = t(8, 0, 0);
            assert_eq!(time_until(t(10, 30, 0), now), "in 2h 30m");
            assert_eq!(time_until(t(8, 0, 10), now), "in 1m");
            assert_eq!(time_until(t(8, 0, 0) + Duration::days(1), now), "in 1d");
            assert_eq!(time_until(t(7, 0, 0), now), "overdue");
        }
    }
}
