//! Wall-clock scheduling helpers for the "run at HH:MM" trigger.

use chrono::{DateTime, LocalResult, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike};

/// Next occurrence of `execution_time` (seconds zeroed) at or after `now`.
///
/// Today if that minute has not passed yet, otherwise tomorrow.
pub fn next_execution_time<Tz: TimeZone>(execution_time: NaiveTime, now: &DateTime<Tz>) -> DateTime<Tz> {
    let time = execution_time
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(execution_time);

    let tz = now.timezone();
    let today = resolve_local(&tz, now.date_naive().and_time(time));
    if today >= *now {
        return today;
    }
    resolve_local(&tz, (now.date_naive() + TimeDelta::days(1)).and_time(time))
}

/// Maps a local wall-clock time to an instant. Ambiguous times (DST fall
/// back) take the earlier instant; times inside a DST gap move forward an
/// hour.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
        LocalResult::None => tz
            .from_local_datetime(&(naive + TimeDelta::hours(1)))
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    }
}

/// When the alarm should fire: `lead` before the target, so the first
/// attempt is already in flight when slots open.
pub fn alarm_time<Tz: TimeZone>(target: &DateTime<Tz>, lead: TimeDelta) -> DateTime<Tz> {
    target.clone() - lead
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn later_today_stays_today() {
        let now = kst().with_ymd_and_hms(2025, 7, 14, 8, 30, 0).unwrap();
        let next = next_execution_time(hm(9, 0), &now);

        assert_eq!(next, kst().with_ymd_and_hms(2025, 7, 14, 9, 0, 0).unwrap());
    }

    #[test]
    fn past_time_rolls_to_tomorrow() {
        let now = kst().with_ymd_and_hms(2025, 7, 14, 9, 0, 1).unwrap();
        let next = next_execution_time(hm(9, 0), &now);

        assert_eq!(next, kst().with_ymd_and_hms(2025, 7, 15, 9, 0, 0).unwrap());
    }

    #[test]
    fn seconds_are_ignored() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        let next = next_execution_time(NaiveTime::from_hms_opt(23, 59, 42).unwrap(), &now);

        assert_eq!(next, Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 0).unwrap());
    }

    #[test]
    fn alarm_fires_before_target() {
        let target = Utc.with_ymd_and_hms(2025, 7, 14, 9, 0, 0).unwrap();
        let alarm = alarm_time(&target, TimeDelta::seconds(2));

        assert_eq!(alarm, Utc.with_ymd_and_hms(2025, 7, 14, 8, 59, 58).unwrap());
    }
}
