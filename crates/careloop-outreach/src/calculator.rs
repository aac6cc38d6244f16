//! Pure next-run computation. Takes `now` and the patient's UTC offset as
//! explicit parameters; never reads the machine clock or local timezone.

use careloop_common::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Next absolute instant at which a schedule with the given local
/// wall-clock time should fire.
///
/// `local_time` is "HH:MM" interpreted in the patient's fixed UTC offset.
/// If today's candidate is not strictly after `now_utc`, the run rolls to
/// the same wall-clock time tomorrow; firing exactly at `now` counts as
/// already passed.
pub fn next_run(
    local_time: &str,
    utc_offset_minutes: i32,
    now_utc: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let time = parse_local_time(local_time)?;
    let offset = fixed_offset(utc_offset_minutes)?;

    let today_local = now_utc.with_timezone(&offset).date_naive();
    let candidate = local_instant(today_local, time, offset)?;

    if candidate > now_utc {
        Ok(candidate)
    } else {
        // Advance one calendar day in local time, then convert back.
        let tomorrow = today_local + Duration::days(1);
        local_instant(tomorrow, time, offset)
    }
}

/// Absolute run instant for an explicit local date, used by `once`
/// schedules.
pub fn run_instant_on(
    date: NaiveDate,
    local_time: &str,
    utc_offset_minutes: i32,
) -> Result<DateTime<Utc>> {
    let time = parse_local_time(local_time)?;
    let offset = fixed_offset(utc_offset_minutes)?;
    local_instant(date, time, offset)
}

fn parse_local_time(local_time: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(local_time, "%H:%M")
        .map_err(|_| Error::Validation(format!("invalid time of day '{local_time}', expected HH:MM")))
}

fn fixed_offset(utc_offset_minutes: i32) -> Result<chrono::FixedOffset> {
    chrono::FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
        Error::Validation(format!("utc offset out of range: {utc_offset_minutes} minutes"))
    })
}

fn local_instant(
    date: NaiveDate,
    time: NaiveTime,
    offset: chrono::FixedOffset,
) -> Result<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::Validation("unrepresentable local datetime".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn fires_today_when_time_still_ahead() {
        // 09:30 at UTC+2 is 07:30 UTC; now is 06:00 UTC.
        let now = utc(2026, 3, 10, 6, 0, 0);
        let run = next_run("09:30", 120, now).unwrap();
        assert_eq!(run, utc(2026, 3, 10, 7, 30, 0));
        assert!(run > now);
    }

    #[test]
    fn rolls_to_tomorrow_when_time_passed() {
        let now = utc(2026, 3, 10, 8, 0, 0);
        let run = next_run("09:30", 120, now).unwrap();
        assert_eq!(run, utc(2026, 3, 11, 7, 30, 0));
    }

    #[test]
    fn exact_now_counts_as_passed() {
        // Tie-break favors rollover, not re-firing.
        let now = utc(2026, 3, 10, 7, 30, 0);
        let run = next_run("09:30", 120, now).unwrap();
        assert_eq!(run, utc(2026, 3, 11, 7, 30, 0));
    }

    #[test]
    fn one_second_before_still_fires_today() {
        let now = utc(2026, 3, 10, 7, 29, 59);
        let run = next_run("09:30", 120, now).unwrap();
        assert_eq!(run, utc(2026, 3, 10, 7, 30, 0));
    }

    #[test]
    fn negative_offset_crosses_utc_midnight() {
        // 22:00 at UTC-5 is 03:00 UTC the next calendar day.
        let now = utc(2026, 3, 10, 1, 0, 0);
        let run = next_run("22:00", -300, now).unwrap();
        assert_eq!(run, utc(2026, 3, 10, 3, 0, 0));

        // Once 03:00 UTC has passed, the next occurrence is a day later.
        let later = utc(2026, 3, 10, 4, 0, 0);
        let run = next_run("22:00", -300, later).unwrap();
        assert_eq!(run, utc(2026, 3, 11, 3, 0, 0));
    }

    #[test]
    fn result_is_minimal_future_instant() {
        // Scan a day of nows: next_run is always strictly greater than now
        // and never more than 24h ahead.
        for hour in 0..24 {
            let now = utc(2026, 6, 1, hour, 17, 3);
            let run = next_run("14:45", 60, now).unwrap();
            assert!(run > now, "run {run} not after now {now}");
            assert!(run - now <= Duration::days(1), "skipped a day from {now}");
        }
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let now = utc(2026, 3, 10, 6, 0, 0);
        assert_eq!(
            next_run("09:30", 120, now).unwrap(),
            next_run("09:30", 120, now).unwrap()
        );
    }

    #[test]
    fn rejects_malformed_time() {
        let now = Utc::now();
        for bad in ["9h30", "25:00", "12:61", "12:30:15", "noon", ""] {
            let err = next_run(bad, 0, now).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "'{bad}' should be rejected");
        }
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let err = next_run("09:00", 100_000, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn explicit_date_instant() {
        let date = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let run = run_instant_on(date, "08:00", 120).unwrap();
        assert_eq!(run, utc(2026, 4, 1, 6, 0, 0));
    }
}
