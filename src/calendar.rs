//! Calendar helpers: week resolution, month names and input validation.
//!
//! Weeks are anchored on the earliest Monday on or after January 1. This is
//! not ISO-8601 week numbering: a year starting on a Tuesday has its week 1
//! begin on the following Monday, and the days before it belong to no week.

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::error::{Result, TrafficError};

/// Earliest year the traffic API is queried for.
pub const MIN_YEAR: i32 = 2019;

/// Highest week number that can still start inside a year.
pub const MAX_WEEK: u32 = 53;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Inclusive date span of one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekRange {
    pub week: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekRange {
    /// Number of calendar days covered, 7 unless the end was clamped.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn label(&self) -> String {
        week_label(self.week)
    }
}

/// The earliest Monday that is on or after January 1 of `year`.
pub fn first_monday(year: i32) -> Option<NaiveDate> {
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let offset = (7 - jan1.weekday().num_days_from_monday()) % 7;
    jan1.checked_add_days(Days::new(offset as u64))
}

/// Resolves `week` of `year` into its date span.
///
/// Returns `None` when the week does not start inside `year` (or the year is
/// not resolvable at all). A week that runs into the next year is clamped to
/// December 31.
pub fn week_range(year: i32, week: u32) -> Option<WeekRange> {
    if year < MIN_YEAR || week == 0 {
        return None;
    }

    let start = first_monday(year)?.checked_add_days(Days::new(7 * (week as u64 - 1)))?;
    if start.year() != year {
        return None;
    }

    let mut end = start.checked_add_days(Days::new(6))?;
    if end.year() != year {
        end = NaiveDate::from_ymd_opt(year, 12, 31)?;
    }

    Some(WeekRange { week, start, end })
}

/// Resolves a batch of week numbers, silently dropping those outside `year`.
///
/// The result is ordered ascending by week number and free of duplicates.
pub fn resolve_weeks(year: i32, weeks: &[u32]) -> Vec<WeekRange> {
    let mut weeks = weeks.to_vec();
    weeks.sort_unstable();
    weeks.dedup();
    weeks
        .into_iter()
        .filter_map(|w| week_range(year, w))
        .collect()
}

/// Display label for a week, e.g. `"Uke 7"`.
pub fn week_label(week: u32) -> String {
    format!("Uke {week}")
}

/// English name of a 1-based month number.
pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get((month as usize).checked_sub(1)?).copied()
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next - first).num_days() as u32)
}

pub fn validate_year(year: i32) -> Result<()> {
    if year < MIN_YEAR {
        return Err(TrafficError::out_of_range(format!(
            "year {year} is before {MIN_YEAR}, the earliest year with data"
        )));
    }
    Ok(())
}

pub fn validate_week(week: u32) -> Result<()> {
    if week == 0 || week > MAX_WEEK {
        return Err(TrafficError::out_of_range(format!(
            "week {week} is outside 1..={MAX_WEEK}"
        )));
    }
    Ok(())
}

pub fn validate_month(month: u32) -> Result<()> {
    if month == 0 || month > 12 {
        return Err(TrafficError::out_of_range(format!(
            "month {month} is outside 1..=12"
        )));
    }
    Ok(())
}

/// Parses a comma separated list such as `"2024, 2023,2022"`.
///
/// Empty items are ignored; anything that is not a number is rejected.
pub fn parse_number_list<T: std::str::FromStr>(input: &str) -> Result<Vec<T>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| TrafficError::out_of_range(format!("'{s}' is not a valid number")))
        })
        .collect()
}

/// Returns true if `date` is a Monday.
pub fn is_monday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Mon
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_first_monday_when_year_starts_on_tuesday() {
        // 2019-01-01 is a Tuesday
        assert_eq!(first_monday(2019), Some(date(2019, 1, 7)));
    }

    #[test]
    fn test_first_monday_when_year_starts_on_monday() {
        // 2024-01-01 is a Monday
        assert_eq!(first_monday(2024), Some(date(2024, 1, 1)));
    }

    #[test]
    fn test_week_one_of_2019() {
        let w = week_range(2019, 1).unwrap();
        assert_eq!(w.start, date(2019, 1, 7));
        assert_eq!(w.end, date(2019, 1, 13));
        assert_eq!(w.label(), "Uke 1");
    }

    #[test]
    fn test_weeks_are_monday_to_sunday_unless_clamped() {
        for year in MIN_YEAR..=2030 {
            for week in 1..=52 {
                let Some(w) = week_range(year, week) else {
                    continue;
                };
                assert!(is_monday(w.start), "{year} week {week}");
                let clamped = w.end == date(year, 12, 31);
                if !clamped {
                    assert_eq!((w.end - w.start).num_days(), 6, "{year} week {week}");
                } else {
                    assert!((w.end - w.start).num_days() <= 6);
                }
            }
        }
    }

    #[test]
    fn test_last_week_is_clamped_to_new_years_eve() {
        // 2019 week 52 starts 2019-12-30 and would end 2020-01-05
        let w = week_range(2019, 52).unwrap();
        assert_eq!(w.start, date(2019, 12, 30));
        assert_eq!(w.end, date(2019, 12, 31));
        assert_eq!(w.days(), 2);
    }

    #[test]
    fn test_week_starting_next_year_is_skipped() {
        assert_eq!(week_range(2019, 53), None);
        assert_eq!(resolve_weeks(2019, &[53, 1]).len(), 1);
    }

    #[test]
    fn test_week_53_can_exist() {
        // 2024 starts on a Monday and is a leap year: week 53 starts Dec 30
        let w = week_range(2024, 53).unwrap();
        assert_eq!(w.start, date(2024, 12, 30));
        assert_eq!(w.end, date(2024, 12, 31));
    }

    #[test]
    fn test_years_before_minimum_are_not_resolvable() {
        assert_eq!(week_range(2018, 10), None);
        assert!(validate_year(2018).is_err());
        assert!(validate_year(2019).is_ok());
    }

    #[test]
    fn test_resolve_weeks_sorts_and_dedups() {
        let weeks: Vec<u32> = resolve_weeks(2023, &[5, 2, 5, 3])
            .iter()
            .map(|w| w.week)
            .collect();
        assert_eq!(weeks, vec![2, 3, 5]);
    }

    #[test]
    fn test_validate_week_and_month() {
        assert!(validate_week(0).is_err());
        assert!(validate_week(54).is_err());
        assert!(validate_week(1).is_ok());
        assert!(validate_month(0).is_err());
        assert!(validate_month(13).is_err());
        assert!(validate_month(12).is_ok());
    }

    #[test]
    fn test_month_names_and_days() {
        assert_eq!(month_name(1), Some("January"));
        assert_eq!(month_name(12), Some("December"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_name(13), None);
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2023, 12), Some(31));
    }

    #[test]
    fn test_parse_number_list() {
        let years: Vec<i32> = parse_number_list("2024, 2023,2022,").unwrap();
        assert_eq!(years, vec![2024, 2023, 2022]);

        let err = parse_number_list::<i32>("2024,twenty").unwrap_err();
        assert!(matches!(err, TrafficError::OutOfRangeRequest { .. }));
    }
}
