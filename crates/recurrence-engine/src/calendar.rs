//! Calendar arithmetic used by the expansion engine.
//!
//! Everything here is a pure function of a year (and, for weekday ordinals, the
//! month being expanded). Days are addressed by their zero-based index from
//! January 1st; indices past the end of the year continue into the first week
//! of the next year so weekly periods can straddle New Year.

use chrono::{Datelike, Duration, NaiveDate};

use crate::iter::Plan;
use crate::options::Frequency;

/// Highest year the engine expands into.
pub const MAX_YEAR: i32 = 9999;

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub fn days_in_year(year: i32) -> u32 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ if is_leap_year(year) => 29,
        _ => 28,
    }
}

/// Gregorian Easter Sunday of `year`.
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let g = year % 19;
    let c = year / 100;
    let h = (c - c / 4 - (8 * c + 13) / 25 + 19 * g + 15) % 30;
    let i = h - (h / 28) * (1 - (h / 28) * (29 / (h + 1)) * ((21 - g) / 11));
    let j = (year + year / 4 + i + 2 - c + c / 4) % 7;
    let p = i - j;
    let day = 1 + (p + 27 + (p + 6) / 40) % 31;
    let month = 3 + (p + 26) / 30;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Per-year lookup tables, rebuilt whenever expansion moves to a new year
/// (and, for weekday ordinals, a new month).
#[derive(Debug, Clone)]
pub(crate) struct YearInfo {
    pub year: i32,
    month: u32,
    pub year_len: usize,
    next_year_len: usize,
    pub first_day: NaiveDate,
    /// Weekday of January 1st, Monday = 0.
    year_weekday: usize,
    /// Cumulative day index at the start of each month; `month_range[12]` is
    /// the year length.
    month_range: [usize; 13],
    month_mask: Vec<u32>,
    month_day_mask: Vec<i32>,
    neg_month_day_mask: Vec<i32>,
    week_no_mask: Option<Vec<bool>>,
    nth_weekday_mask: Option<Vec<bool>>,
    easter_mask: Option<Vec<bool>>,
}

impl YearInfo {
    pub fn new(year: i32, month: u32, plan: &Plan) -> Option<Self> {
        let first_day = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let year_len = days_in_year(year) as usize;
        let mut info = YearInfo {
            year,
            month,
            year_len,
            next_year_len: days_in_year(year + 1) as usize,
            first_day,
            year_weekday: first_day.weekday().num_days_from_monday() as usize,
            month_range: [0; 13],
            month_mask: Vec::with_capacity(year_len + 7),
            month_day_mask: Vec::with_capacity(year_len + 7),
            neg_month_day_mask: Vec::with_capacity(year_len + 7),
            week_no_mask: None,
            nth_weekday_mask: None,
            easter_mask: None,
        };

        for m in 1..=12u32 {
            let len = days_in_month(year, m);
            info.month_range[m as usize] = info.month_range[m as usize - 1] + len as usize;
            for d in 1..=len {
                info.month_mask.push(m);
                info.month_day_mask.push(d as i32);
                info.neg_month_day_mask.push(d as i32 - len as i32 - 1);
            }
        }
        // First week of the next January.
        for d in 1..=7 {
            info.month_mask.push(1);
            info.month_day_mask.push(d);
            info.neg_month_day_mask.push(d - 32);
        }

        if !plan.by_week_no.is_empty() {
            info.week_no_mask = Some(info.build_week_no_mask(plan));
        }
        if !plan.by_easter.is_empty() {
            info.easter_mask = Some(info.build_easter_mask(plan));
        }
        info.nth_weekday_mask = info.build_nth_weekday_mask(plan);
        Some(info)
    }

    /// Refresh the tables for (`year`, `month`), reusing what is still valid.
    pub fn rebuild(&mut self, year: i32, month: u32, plan: &Plan) -> Option<()> {
        if year != self.year {
            *self = YearInfo::new(year, month, plan)?;
        } else if month != self.month {
            self.month = month;
            self.nth_weekday_mask = self.build_nth_weekday_mask(plan);
        }
        Some(())
    }

    pub fn date_of(&self, index: usize) -> NaiveDate {
        self.first_day + Duration::days(index as i64)
    }

    pub fn index_of(&self, date: NaiveDate) -> usize {
        (date - self.first_day).num_days() as usize
    }

    /// Weekday of a day index, Monday = 0. Valid for any index, including
    /// negative ones and those past the end of the year.
    pub fn weekday_of(&self, index: i64) -> u32 {
        (self.year_weekday as i64 + index).rem_euclid(7) as u32
    }

    /// Day-index range `[start, end)` of `month`.
    pub fn month_bounds(&self, month: u32) -> (usize, usize) {
        (
            self.month_range[month as usize - 1],
            self.month_range[month as usize],
        )
    }

    /// True when day `index` fails any of the plan's day-level filters.
    pub fn is_filtered(&self, index: usize, plan: &Plan) -> bool {
        let i = index;
        (!plan.by_month.is_empty() && !plan.by_month.contains(&self.month_mask[i]))
            || self
                .week_no_mask
                .as_ref()
                .is_some_and(|mask| !mask[i])
            || (!plan.by_weekday.is_empty()
                && !plan.by_weekday.contains(&self.weekday_of(i as i64)))
            || self
                .nth_weekday_mask
                .as_ref()
                .is_some_and(|mask| !mask.get(i).copied().unwrap_or(false))
            || self.easter_mask.as_ref().is_some_and(|mask| !mask[i])
            || ((!plan.by_month_day.is_empty() || !plan.by_neg_month_day.is_empty())
                && !plan.by_month_day.contains(&self.month_day_mask[i])
                && !plan.by_neg_month_day.contains(&self.neg_month_day_mask[i]))
            || (!plan.by_year_day.is_empty() && !self.matches_year_day(i, plan))
    }

    fn matches_year_day(&self, i: usize, plan: &Plan) -> bool {
        let i = i as i32;
        let year_len = self.year_len as i32;
        if i < year_len {
            plan.by_year_day.contains(&(i + 1)) || plan.by_year_day.contains(&(i - year_len))
        } else {
            let next_len = self.next_year_len as i32;
            plan.by_year_day.contains(&(i + 1 - year_len))
                || plan.by_year_day.contains(&(i - year_len - next_len))
        }
    }

    /// Mark the days belonging to the requested ISO-style week numbers, where
    /// week 1 is the first week with at least four days in this year and weeks
    /// start on WKST.
    fn build_week_no_mask(&self, plan: &Plan) -> Vec<bool> {
        let mut mask = vec![false; self.year_len + 7];
        let wkst = plan.wkst as usize;
        let year_len = self.year_len as i64;

        let first_wkst = (7 - self.year_weekday + wkst) % 7;
        let (no1_wkst, week_year_len) = if first_wkst >= 4 {
            // Week 1 starts last year; count the days borrowed from it.
            (0, year_len + ((self.year_weekday + 7 - wkst) % 7) as i64)
        } else {
            (first_wkst, year_len - first_wkst as i64)
        };
        let num_weeks = week_year_len / 7 + (week_year_len % 7) / 4;

        let mark_week = |mask: &mut Vec<bool>, mut i: i64| {
            for _ in 0..7 {
                if i < 0 || i as usize >= mask.len() {
                    break;
                }
                mask[i as usize] = true;
                i += 1;
                if self.weekday_of(i) == plan.wkst {
                    break;
                }
            }
        };
        let week_start = |n: i64| {
            let mut i = no1_wkst as i64 + (n - 1) * 7;
            if no1_wkst != first_wkst {
                i -= (7 - first_wkst) as i64;
            }
            i
        };

        for &week in &plan.by_week_no {
            let n = if week < 0 {
                i64::from(week) + num_weeks + 1
            } else {
                i64::from(week)
            };
            if !(1..=num_weeks).contains(&n) {
                continue;
            }
            let start = if n > 1 { week_start(n) } else { no1_wkst as i64 };
            mark_week(&mut mask, start);
        }

        if plan.by_week_no.contains(&1) {
            // Days at the end of this year that belong to week 1 of next year.
            let i = week_start(num_weeks + 1);
            if i < year_len {
                mark_week(&mut mask, i);
            }
        }

        if no1_wkst > 0 {
            // Days at the start of this year that belong to the last week of
            // the previous year.
            let last_year_weeks = if plan.by_week_no.contains(&-1) {
                -1
            } else {
                let prev_weekday = (self.year_weekday as i64 - days_in_year(self.year - 1) as i64)
                    .rem_euclid(7) as usize;
                let prev_no1_wkst = (7 - prev_weekday + wkst) % 7;
                let prev_len = days_in_year(self.year - 1) as i64;
                if prev_no1_wkst >= 4 {
                    52 + (prev_len + ((prev_weekday + 7 - wkst) % 7) as i64) % 7 / 4
                } else {
                    52 + (year_len - no1_wkst as i64) % 7 / 4
                }
            };
            if plan.by_week_no.contains(&(last_year_weeks as i32)) {
                for slot in mask.iter_mut().take(no1_wkst) {
                    *slot = true;
                }
            }
        }
        mask
    }

    /// Mark the nth-weekday days (`BYDAY=+2TU`, `-1FR`) of the current
    /// period. Only YEARLY and MONTHLY rules carry ordinals.
    fn build_nth_weekday_mask(&self, plan: &Plan) -> Option<Vec<bool>> {
        if plan.by_nth_weekday.is_empty() {
            return None;
        }
        let ranges: Vec<(usize, usize)> = match plan.freq {
            Frequency::Yearly if plan.by_month.is_empty() => vec![(0, self.year_len)],
            Frequency::Yearly => plan
                .by_month
                .iter()
                .map(|m| self.month_bounds(*m))
                .collect(),
            Frequency::Monthly => vec![self.month_bounds(self.month)],
            _ => return None,
        };

        let mut mask = vec![false; self.year_len];
        for (first, end) in ranges {
            let (first, last) = (first as i64, end as i64 - 1);
            for &(weekday, n) in &plan.by_nth_weekday {
                let weekday = i64::from(weekday);
                let i = if n < 0 {
                    let i = last + (i64::from(n) + 1) * 7;
                    i - (i64::from(self.weekday_of(i)) - weekday).rem_euclid(7)
                } else {
                    let i = first + (i64::from(n) - 1) * 7;
                    i + (7 - i64::from(self.weekday_of(i)) + weekday).rem_euclid(7)
                };
                if (first..=last).contains(&i) {
                    mask[i as usize] = true;
                }
            }
        }
        Some(mask)
    }

    fn build_easter_mask(&self, plan: &Plan) -> Vec<bool> {
        let mut mask = vec![false; self.year_len + 7];
        if let Some(easter) = easter_sunday(self.year) {
            let easter_index = self.index_of(easter) as i64;
            for offset in &plan.by_easter {
                let i = easter_index + i64::from(*offset);
                if (0..self.year_len as i64).contains(&i) {
                    mask[i as usize] = true;
                }
            }
        }
        mask
    }
}
