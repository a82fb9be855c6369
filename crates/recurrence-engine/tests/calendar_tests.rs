//! Calendar arithmetic: leap years, month lengths and Gregorian Easter.

use chrono::NaiveDate;
use recurrence_engine::calendar::{days_in_month, days_in_year, easter_sunday, is_leap_year};

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn leap_years_follow_gregorian_rules() {
    assert!(is_leap_year(2024));
    assert!(is_leap_year(2000));
    assert!(!is_leap_year(1900));
    assert!(!is_leap_year(2023));
    assert_eq!(days_in_year(2000), 366);
    assert_eq!(days_in_year(2100), 365);
}

#[test]
fn month_lengths() {
    assert_eq!(days_in_month(2024, 2), 29);
    assert_eq!(days_in_month(2023, 2), 28);
    assert_eq!(days_in_month(2023, 4), 30);
    assert_eq!(days_in_month(2023, 12), 31);
}

#[test]
fn easter_dates() {
    assert_eq!(easter_sunday(1997), Some(ymd(1997, 3, 30)));
    assert_eq!(easter_sunday(2000), Some(ymd(2000, 4, 23)));
    assert_eq!(easter_sunday(2024), Some(ymd(2024, 3, 31)));
    assert_eq!(easter_sunday(2025), Some(ymd(2025, 4, 20)));
}

#[test]
fn easter_extremes() {
    // Earliest possible (March 22) and latest possible (April 25).
    assert_eq!(easter_sunday(1818), Some(ymd(1818, 3, 22)));
    assert_eq!(easter_sunday(1943), Some(ymd(1943, 4, 25)));
}
