//! Calendar rules mapping integer schedule units onto dates.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use pyo3::prelude::*;

/// Maps schedule time units onto calendar dates.
///
/// Implementations must be pure: the same inputs always give the same date.
pub trait Calendar {
    /// Date reached after `units` schedule units counted from `date`.
    fn add_units(&self, date: NaiveDate, units: i64) -> NaiveDate;

    /// Number of schedule units between `from` and `to` (negative if `to` is earlier).
    fn units_between(&self, from: NaiveDate, to: NaiveDate) -> i64;
}

/// Built-in calendar strategies.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CalendarRule {
    /// Every day is a working day.
    #[default]
    CalendarDays,
    /// Monday to Friday only.
    BusinessDays,
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(date)
}

fn prev_day(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(1)).unwrap_or(date)
}

/// Roll a weekend date forward to the following Monday.
fn roll_forward(mut date: NaiveDate) -> NaiveDate {
    while is_weekend(date) {
        date = next_day(date);
    }
    date
}

impl Calendar for CalendarRule {
    fn add_units(&self, date: NaiveDate, units: i64) -> NaiveDate {
        match self {
            CalendarRule::CalendarDays => {
                if units >= 0 {
                    date.checked_add_days(Days::new(units as u64))
                        .unwrap_or(date)
                } else {
                    date.checked_sub_days(Days::new(units.unsigned_abs()))
                        .unwrap_or(date)
                }
            }
            CalendarRule::BusinessDays => {
                let mut current = roll_forward(date);
                let mut remaining = units;
                while remaining > 0 {
                    current = next_day(current);
                    if !is_weekend(current) {
                        remaining -= 1;
                    }
                }
                while remaining < 0 {
                    current = prev_day(current);
                    if !is_weekend(current) {
                        remaining += 1;
                    }
                }
                current
            }
        }
    }

    fn units_between(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        match self {
            CalendarRule::CalendarDays => (to - from).num_days(),
            CalendarRule::BusinessDays => {
                let (start, end, sign) = if from <= to {
                    (roll_forward(from), roll_forward(to), 1)
                } else {
                    (roll_forward(to), roll_forward(from), -1)
                };
                let mut count = 0;
                let mut current = start;
                while current < end {
                    current = next_day(current);
                    if !is_weekend(current) {
                        count += 1;
                    }
                }
                count * sign
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_calendar_days() {
        let rule = CalendarRule::CalendarDays;
        assert_eq!(rule.add_units(d(2025, 1, 1), 10), d(2025, 1, 11));
        assert_eq!(rule.add_units(d(2025, 1, 11), -10), d(2025, 1, 1));
        assert_eq!(rule.units_between(d(2025, 1, 1), d(2025, 1, 11)), 10);
    }

    #[test]
    fn test_business_days_skip_weekend() {
        let rule = CalendarRule::BusinessDays;
        // 2025-01-03 is a Friday
        assert_eq!(rule.add_units(d(2025, 1, 3), 1), d(2025, 1, 6));
        assert_eq!(rule.add_units(d(2025, 1, 3), 5), d(2025, 1, 10));
        assert_eq!(rule.add_units(d(2025, 1, 6), -1), d(2025, 1, 3));
    }

    #[test]
    fn test_business_days_weekend_start_rolls_forward() {
        let rule = CalendarRule::BusinessDays;
        // Saturday rolls to Monday before counting
        assert_eq!(rule.add_units(d(2025, 1, 4), 0), d(2025, 1, 6));
        assert_eq!(rule.add_units(d(2025, 1, 4), 1), d(2025, 1, 7));
    }

    #[test]
    fn test_business_units_between_inverts_add() {
        let rule = CalendarRule::BusinessDays;
        let start = d(2025, 1, 2);
        for units in 0..15 {
            let date = rule.add_units(start, units);
            assert_eq!(rule.units_between(start, date), units);
        }
        assert_eq!(rule.units_between(d(2025, 1, 10), d(2025, 1, 3)), -5);
    }
}
