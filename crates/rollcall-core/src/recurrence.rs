//! Recurrence resolution
//!
//! Occurrences are computed on the local calendar and keep the time of day
//! of the series' first start. Weeks run Sunday to Saturday and are counted
//! from the week containing the first start; months are counted from the
//! month containing it. The first start is occurrence 1.
//!
//! A local time that does not exist (DST gap) is skipped; an ambiguous one
//! resolves to the earlier instant (see `rollcall_util::resolve_in`).

use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, NaiveTime};
use rollcall_api::{Frequency, RecurrenceEnd, RecurrencePattern};
use rollcall_util::local_from_naive;

/// Upper bound on candidate days/months examined for one lookup. Patterns that
/// can never produce a date (e.g. only the 30th, every 12 months from February)
/// resolve to `None` instead of looping.
const MAX_CANDIDATES: u32 = 1_000;

/// Earliest occurrence strictly after `after`, or `None` once the pattern has
/// terminated. Stateless: the count limit is evaluated by walking the series
/// from `base_start`. The end condition only filters; it never changes which
/// instant comes next.
pub fn next(
    pattern: &RecurrencePattern,
    after: DateTime<Local>,
    base_start: DateTime<Local>,
) -> Option<DateTime<Local>> {
    match pattern.end {
        RecurrenceEnd::Count { occurrences } => {
            next_counted(pattern, after, base_start, occurrences)
        }
        RecurrenceEnd::Until { end_date } => {
            next_unbounded(pattern, after, base_start).filter(|t| t.date_naive() <= end_date)
        }
        RecurrenceEnd::Never => next_unbounded(pattern, after, base_start),
    }
}

/// Lazy sequence of every occurrence, starting with `base_start` itself
pub fn occurrences(pattern: &RecurrencePattern, base_start: DateTime<Local>) -> Occurrences<'_> {
    Occurrences {
        pattern,
        base_start,
        last: None,
        done: false,
    }
}

pub struct Occurrences<'a> {
    pattern: &'a RecurrencePattern,
    base_start: DateTime<Local>,
    last: Option<DateTime<Local>>,
    done: bool,
}

impl Iterator for Occurrences<'_> {
    type Item = DateTime<Local>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.last {
            None => Some(self.base_start),
            Some(last) => next(self.pattern, last, self.base_start),
        };
        match item {
            Some(t) => self.last = Some(t),
            None => self.done = true,
        }
        item
    }
}

fn next_counted(
    pattern: &RecurrencePattern,
    after: DateTime<Local>,
    base_start: DateTime<Local>,
    occurrences: u32,
) -> Option<DateTime<Local>> {
    if occurrences == 0 {
        return None;
    }
    if base_start > after {
        return Some(base_start);
    }

    // Occurrences already held at or before `after`
    let mut current = base_start;
    let mut held = 1;
    while held < occurrences {
        match next_unbounded(pattern, current, base_start) {
            Some(candidate) if candidate <= after => {
                current = candidate;
                held += 1;
            }
            _ => break,
        }
    }
    if held >= occurrences {
        return None;
    }
    next_unbounded(pattern, after, base_start)
}

fn next_unbounded(
    pattern: &RecurrencePattern,
    after: DateTime<Local>,
    base_start: DateTime<Local>,
) -> Option<DateTime<Local>> {
    let interval = pattern.interval.max(1);
    let time = base_start.time();

    match pattern.frequency {
        Frequency::Daily => next_daily(interval, after, time),
        Frequency::Weekly => next_weekly(pattern, interval, after, base_start),
        Frequency::Monthly => next_monthly(pattern, interval, after, base_start),
    }
}

/// `interval` days after `after`'s date, at the series' time of day
fn next_daily(interval: u32, after: DateTime<Local>, time: NaiveTime) -> Option<DateTime<Local>> {
    let mut date = after.date_naive();
    for _ in 0..MAX_CANDIDATES {
        date = date.checked_add_days(Days::new(u64::from(interval)))?;
        if let Some(candidate) = at(date, time)
            && candidate > after
        {
            return Some(candidate);
        }
    }
    None
}

fn next_weekly(
    pattern: &RecurrencePattern,
    interval: u32,
    after: DateTime<Local>,
    base_start: DateTime<Local>,
) -> Option<DateTime<Local>> {
    if pattern.days_of_week.is_empty() {
        return None;
    }

    let time = base_start.time();
    let base_date = base_start.date_naive();
    let anchor = week_start(base_date);
    let period = i64::from(interval) * 7;

    let mut date = after.date_naive().max(base_date);
    for _ in 0..MAX_CANDIDATES {
        let offset = (date - anchor).num_days();
        let week = offset.div_euclid(7);

        if week % i64::from(interval) != 0 {
            // Jump to the first day of the next active week
            let next_active = (week / i64::from(interval) + 1) * period;
            date = anchor.checked_add_days(Days::new(u64::try_from(next_active).ok()?))?;
            continue;
        }

        if pattern.days_of_week.contains(date.weekday())
            && let Some(candidate) = at(date, time)
            && candidate > after
        {
            return Some(candidate);
        }
        date = date.succ_opt()?;
    }
    None
}

fn next_monthly(
    pattern: &RecurrencePattern,
    interval: u32,
    after: DateTime<Local>,
    base_start: DateTime<Local>,
) -> Option<DateTime<Local>> {
    let days = pattern.days_of_month.days();
    if days.is_empty() {
        return None;
    }

    let time = base_start.time();
    let base_date = base_start.date_naive();
    let base_month = month_index(base_date);
    let from = after.date_naive().max(base_date);

    // First month at or after `from` that is a whole number of intervals from the base
    let elapsed = month_index(from) - base_month;
    let interval = i64::from(interval);
    let mut step = elapsed.div_euclid(interval) + i64::from(elapsed.rem_euclid(interval) != 0);

    let first_of_base = base_date.with_day(1)?;
    for _ in 0..MAX_CANDIDATES {
        let months = u32::try_from(step * interval).ok()?;
        let first = first_of_base.checked_add_months(Months::new(months))?;

        for &day in &days {
            // Days the month does not have are skipped, never clamped
            let Some(date) = NaiveDate::from_ymd_opt(first.year(), first.month(), u32::from(day))
            else {
                continue;
            };
            if let Some(candidate) = at(date, time)
                && candidate > after
            {
                return Some(candidate);
            }
        }
        step += 1;
    }
    None
}

fn at(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    local_from_naive(date.and_time(time))
}

/// Sunday of the week containing `date`
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_sunday()))
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rollcall_util::{DaysOfMonth, DaysOfWeek};

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn pattern(frequency: Frequency, interval: u32) -> RecurrencePattern {
        RecurrencePattern {
            frequency,
            interval,
            days_of_week: DaysOfWeek::NONE,
            days_of_month: DaysOfMonth::NONE,
            end: RecurrenceEnd::Never,
        }
    }

    fn weekly(days: &[u8], interval: u32) -> RecurrencePattern {
        RecurrencePattern {
            days_of_week: DaysOfWeek::from_indices(days).unwrap(),
            ..pattern(Frequency::Weekly, interval)
        }
    }

    fn monthly(days: &[u8], interval: u32) -> RecurrencePattern {
        RecurrencePattern {
            days_of_month: DaysOfMonth::from_days(days).unwrap(),
            ..pattern(Frequency::Monthly, interval)
        }
    }

    #[test]
    fn test_weekly_monday_wednesday() {
        let p = weekly(&[1, 3], 1);
        let base = local(2024, 1, 1, 9, 0); // Monday

        assert_eq!(next(&p, base, base), Some(local(2024, 1, 3, 9, 0)));
        assert_eq!(
            next(&p, local(2024, 1, 3, 9, 0), base),
            Some(local(2024, 1, 8, 9, 0))
        );
    }

    #[test]
    fn test_weekly_ties_resolve_strictly() {
        let p = weekly(&[1], 1);
        let base = local(2024, 1, 1, 9, 0);

        // Just before the start on the same day still yields that day
        assert_eq!(next(&p, local(2024, 1, 8, 8, 59), base), Some(local(2024, 1, 8, 9, 0)));
        // Exactly at the start moves on a week
        assert_eq!(next(&p, local(2024, 1, 8, 9, 0), base), Some(local(2024, 1, 15, 9, 0)));
    }

    #[test]
    fn test_weekly_every_other_week() {
        let p = weekly(&[1, 3], 2);
        let base = local(2024, 1, 1, 9, 0);

        let dates: Vec<_> = occurrences(&p, base).take(5).collect();
        assert_eq!(
            dates,
            vec![
                local(2024, 1, 1, 9, 0),
                local(2024, 1, 3, 9, 0),
                local(2024, 1, 15, 9, 0),
                local(2024, 1, 17, 9, 0),
                local(2024, 1, 29, 9, 0),
            ]
        );
    }

    #[test]
    fn test_daily_keeps_time_of_day() {
        let p = pattern(Frequency::Daily, 2);
        let base = local(2024, 1, 1, 14, 30);

        assert_eq!(next(&p, base, base), Some(local(2024, 1, 3, 14, 30)));
        assert_eq!(
            next(&p, local(2024, 1, 3, 14, 30), base),
            Some(local(2024, 1, 5, 14, 30))
        );
    }

    #[test]
    fn test_monthly_skips_missing_days() {
        let p = monthly(&[31], 1);
        let base = local(2024, 1, 31, 10, 0);

        let dates: Vec<_> = occurrences(&p, base).take(4).collect();
        assert_eq!(
            dates,
            vec![
                local(2024, 1, 31, 10, 0),
                local(2024, 3, 31, 10, 0),
                local(2024, 5, 31, 10, 0),
                local(2024, 7, 31, 10, 0),
            ]
        );
    }

    #[test]
    fn test_monthly_multiple_days_and_interval() {
        let p = monthly(&[1, 15], 3);
        let base = local(2024, 1, 15, 8, 0);

        assert_eq!(next(&p, base, base), Some(local(2024, 4, 1, 8, 0)));
        assert_eq!(next(&p, local(2024, 4, 1, 8, 0), base), Some(local(2024, 4, 15, 8, 0)));
    }

    #[test]
    fn test_monthly_impossible_pattern_terminates() {
        // February only, day 30: never exists
        let p = monthly(&[30], 12);
        let base = local(2024, 2, 1, 8, 0);
        assert_eq!(next(&p, base, base), None);
    }

    #[test]
    fn test_end_date_is_inclusive() {
        let mut p = weekly(&[1], 1);
        p.end = RecurrenceEnd::Until {
            end_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        };
        let base = local(2024, 1, 1, 9, 0);

        assert_eq!(next(&p, base, base), Some(local(2024, 1, 8, 9, 0)));
        assert_eq!(next(&p, local(2024, 1, 8, 9, 0), base), Some(local(2024, 1, 15, 9, 0)));
        assert_eq!(next(&p, local(2024, 1, 15, 9, 0), base), None);
    }

    #[test]
    fn test_count_limit_does_not_shift_next_occurrence() {
        let base = local(2024, 1, 1, 9, 0);
        let off_grid = local(2024, 1, 2, 8, 0);

        let unbounded = pattern(Frequency::Daily, 1);
        let mut counted = unbounded.clone();
        counted.end = RecurrenceEnd::Count { occurrences: 10 };
        let mut until = unbounded.clone();
        until.end = RecurrenceEnd::Until {
            end_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        };

        let expected = next(&unbounded, off_grid, base);
        assert_eq!(expected, Some(local(2024, 1, 3, 9, 0)));
        assert_eq!(next(&counted, off_grid, base), expected);
        assert_eq!(next(&until, off_grid, base), expected);

        let mon_wed = weekly(&[1, 3], 1);
        let mut mon_wed_counted = mon_wed.clone();
        mon_wed_counted.end = RecurrenceEnd::Count { occurrences: 10 };
        let tuesday = local(2024, 1, 2, 12, 0);
        assert_eq!(next(&mon_wed_counted, tuesday, base), next(&mon_wed, tuesday, base));
    }

    #[test]
    fn test_occurrence_count_includes_first() {
        let mut p = pattern(Frequency::Daily, 1);
        p.end = RecurrenceEnd::Count { occurrences: 3 };
        let base = local(2024, 1, 1, 9, 0);

        let dates: Vec<_> = occurrences(&p, base).collect();
        assert_eq!(
            dates,
            vec![
                local(2024, 1, 1, 9, 0),
                local(2024, 1, 2, 9, 0),
                local(2024, 1, 3, 9, 0),
            ]
        );
        assert_eq!(next(&p, local(2024, 1, 3, 9, 0), base), None);
    }

    #[test]
    fn test_empty_day_sets_never_occur() {
        let base = local(2024, 1, 1, 9, 0);
        assert_eq!(next(&weekly(&[], 1), base, base), None);
        assert_eq!(next(&monthly(&[], 1), base, base), None);
    }
}
