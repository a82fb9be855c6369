//! The expansion engine: a lazy, period-at-a-time generator of occurrences.
//!
//! Each call that runs out of buffered candidates computes exactly one period
//! (a year for YEARLY, a month for MONTHLY, ...), filters its days against the
//! BY-rules, expands the survivors by time-of-day, applies BYSETPOS, and then
//! advances `INTERVAL` periods. Nothing beyond the current period is ever
//! materialized, so rules without COUNT or UNTIL can be consumed safely as
//! long as the consumer stops pulling.

use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use chrono_tz::Tz;

use crate::calendar::{days_in_month, YearInfo, MAX_YEAR};
use crate::dst::DstPolicy;
use crate::options::{Frequency, NWeekday, Options};
use crate::rule::Rule;

/// Consecutive periods without a single candidate after which expansion
/// stops. Bounds filter combinations that can never match, such as
/// `BYMONTH=2;BYMONTHDAY=31`. The sparsest satisfiable daily rule (February
/// 29th) needs about 2,900 periods.
pub const MAX_EMPTY_PERIODS: u32 = 100_000;

/// Wall-clock slack kept in front of a seek target. A DST gap can push a
/// candidate forward by up to a day (Pacific/Apia skipped 2011-12-30), so
/// periods that close to the target still have to be expanded.
const SEEK_MARGIN_HOURS: i64 = 26;

/// Normalized options flattened into the shape the engine consumes.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub freq: Frequency,
    pub interval: i64,
    pub wkst: u32,
    pub count: Option<u32>,
    pub until: Option<DateTime<Tz>>,
    pub dtstart: DateTime<Tz>,
    pub tz: Tz,
    pub dst_policy: DstPolicy,
    pub by_set_pos: Vec<i32>,
    pub by_month: Vec<u32>,
    pub by_month_day: Vec<i32>,
    pub by_neg_month_day: Vec<i32>,
    pub by_year_day: Vec<i32>,
    pub by_week_no: Vec<i32>,
    pub by_weekday: Vec<u32>,
    pub by_nth_weekday: Vec<(u32, i32)>,
    pub by_hour: Vec<u32>,
    pub by_minute: Vec<u32>,
    pub by_second: Vec<u32>,
    pub by_easter: Vec<i32>,
    /// Sorted times of day for frequencies coarser than HOURLY.
    pub timeset: Vec<NaiveTime>,
}

impl Plan {
    /// `options` must be normalized (DTSTART present, defaults filled in).
    pub fn new(options: &Options, dtstart: DateTime<Tz>, dst_policy: DstPolicy) -> Self {
        let mut by_weekday = Vec::new();
        let mut by_nth_weekday = Vec::new();
        for day in &options.by_weekday {
            let weekday = day.weekday().num_days_from_monday();
            match day {
                // Ordinals only mean something inside a month or a year.
                NWeekday::Nth(n, _) if options.freq <= Frequency::Monthly => {
                    by_nth_weekday.push((weekday, *n));
                }
                _ => by_weekday.push(weekday),
            }
        }
        by_weekday.sort_unstable();
        by_weekday.dedup();

        let (by_month_day, by_neg_month_day): (Vec<i32>, Vec<i32>) =
            options.by_month_day.iter().partition(|d| **d > 0);

        let mut plan = Plan {
            freq: options.freq,
            interval: i64::from(options.interval),
            wkst: options.wkst.num_days_from_monday(),
            count: options.count,
            until: options.until,
            dtstart,
            tz: dtstart.timezone(),
            dst_policy,
            by_set_pos: options.by_set_pos.clone(),
            by_month: options.by_month.clone(),
            by_month_day,
            by_neg_month_day,
            by_year_day: options.by_year_day.clone(),
            by_week_no: options.by_week_no.clone(),
            by_weekday,
            by_nth_weekday,
            by_hour: options.by_hour.clone(),
            by_minute: options.by_minute.clone(),
            by_second: options.by_second.clone(),
            by_easter: options.by_easter.clone(),
            timeset: Vec::new(),
        };
        if plan.freq < Frequency::Hourly {
            plan.timeset = plan
                .by_hour
                .iter()
                .flat_map(|h| plan.by_minute.iter().map(move |m| (*h, *m)))
                .flat_map(|(h, m)| plan.by_second.iter().map(move |s| (h, m, *s)))
                .filter_map(|(h, m, s)| NaiveTime::from_hms_opt(h, m, s))
                .collect();
            plan.timeset.sort_unstable();
        }
        plan
    }

    fn hour_timeset(&self, hour: i64) -> Vec<NaiveTime> {
        let mut set: Vec<NaiveTime> = self
            .by_minute
            .iter()
            .flat_map(|m| self.by_second.iter().map(move |s| (*m, *s)))
            .filter_map(|(m, s)| NaiveTime::from_hms_opt(hour as u32, m, s))
            .collect();
        set.sort_unstable();
        set
    }

    fn minute_timeset(&self, hour: i64, minute: i64) -> Vec<NaiveTime> {
        let mut set: Vec<NaiveTime> = self
            .by_second
            .iter()
            .filter_map(|s| NaiveTime::from_hms_opt(hour as u32, minute as u32, *s))
            .collect();
        set.sort_unstable();
        set
    }

    /// Times of day of the first period, when it starts at the given clock
    /// fields.
    fn period_timeset(&self, hour: i64, minute: i64, second: i64) -> Vec<NaiveTime> {
        match self.freq {
            f if f < Frequency::Hourly => self.timeset.clone(),
            _ if !self.time_matches(hour, minute, second) => Vec::new(),
            Frequency::Hourly => self.hour_timeset(hour),
            Frequency::Minutely => self.minute_timeset(hour, minute),
            _ => NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)
                .into_iter()
                .collect(),
        }
    }

    fn time_matches(&self, hour: i64, minute: i64, second: i64) -> bool {
        let contains = |values: &[u32], v: i64| values.is_empty() || values.contains(&(v as u32));
        (self.freq < Frequency::Hourly || contains(&self.by_hour, hour))
            && (self.freq < Frequency::Minutely || contains(&self.by_minute, minute))
            && (self.freq < Frequency::Secondly || contains(&self.by_second, second))
    }

    /// Step `value` by the interval until it lands on a member of `allowed`,
    /// returning the number of wraps past `base` and the landing value.
    fn mod_distance(&self, value: i64, allowed: &[u32], base: i64) -> Option<(i64, i64)> {
        let mut value = value;
        let mut wraps = 0;
        for _ in 0..base {
            let next = value + self.interval;
            wraps += next / base;
            value = next % base;
            if allowed.contains(&(value as u32)) {
                return Some((wraps, value));
            }
        }
        None
    }
}

/// Lazy iterator over the occurrences of a [`Rule`], in ascending order.
#[derive(Debug, Clone)]
pub struct RuleIter<'a> {
    plan: &'a Plan,
    info: Option<YearInfo>,
    year: i32,
    month: u32,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
    weekday: u32,
    timeset: Vec<NaiveTime>,
    pending: VecDeque<DateTime<Tz>>,
    remaining: Option<u32>,
    last: Option<DateTime<Tz>>,
    empty_periods: u32,
    done: bool,
}

impl<'a> RuleIter<'a> {
    pub(crate) fn new(rule: &'a Rule) -> Self {
        let plan = rule.plan();
        let start = plan.dtstart.naive_local();
        let (hour, minute, second) = (
            i64::from(start.hour()),
            i64::from(start.minute()),
            i64::from(start.second()),
        );
        let timeset = plan.period_timeset(hour, minute, second);
        let info = YearInfo::new(start.year(), start.month(), plan);
        RuleIter {
            plan,
            done: info.is_none() || plan.count == Some(0),
            info,
            year: start.year(),
            month: start.month(),
            day: i64::from(start.day()),
            hour,
            minute,
            second,
            weekday: start.weekday().num_days_from_monday(),
            timeset,
            pending: VecDeque::new(),
            remaining: plan.count,
            last: None,
            empty_periods: 0,
        }
    }

    /// Jump ahead to the last INTERVAL-aligned period that starts at least
    /// [`SEEK_MARGIN_HOURS`] of wall-clock time before `target`.
    ///
    /// Only a fresh iterator over a rule without COUNT can seek: with COUNT,
    /// the skipped periods decide where the rule ends.
    pub(crate) fn seek(&mut self, target: DateTime<Tz>) {
        let plan = self.plan;
        if plan.count.is_some() || self.done || self.last.is_some() || !self.pending.is_empty() {
            return;
        }
        let start = plan.dtstart.naive_local();
        let anchor =
            target.with_timezone(&plan.tz).naive_local() - Duration::hours(SEEK_MARGIN_HOURS);
        if anchor <= start {
            return;
        }
        let interval = plan.interval;

        match plan.freq {
            Frequency::Yearly => {
                let years = aligned(i64::from(anchor.year() - start.year()), interval);
                if years == 0 {
                    return;
                }
                self.year = (i64::from(self.year) + years).min(i64::from(MAX_YEAR) + 1) as i32;
            }
            Frequency::Monthly => {
                let elapsed = i64::from(anchor.year() - start.year()) * 12
                    + i64::from(anchor.month())
                    - i64::from(start.month());
                let months = aligned(elapsed, interval);
                if months == 0 {
                    return;
                }
                let total = i64::from(self.year) * 12 + i64::from(self.month) - 1 + months;
                self.year = total.div_euclid(12).min(i64::from(MAX_YEAR) + 1) as i32;
                self.month = total.rem_euclid(12) as u32 + 1;
            }
            Frequency::Weekly => {
                // Every period after the first starts on WKST.
                let offset = (self.weekday + 7 - plan.wkst) % 7;
                let week_start = start.date() - Duration::days(i64::from(offset));
                let weeks = aligned((anchor.date() - week_start).num_days() / 7, interval);
                if weeks == 0 {
                    return;
                }
                self.set_date(week_start + Duration::weeks(weeks));
            }
            Frequency::Daily => {
                let days = aligned((anchor.date() - start.date()).num_days(), interval);
                if days == 0 {
                    return;
                }
                self.set_date(start.date() + Duration::days(days));
            }
            freq => {
                let unit = match freq {
                    Frequency::Hourly => 3600,
                    Frequency::Minutely => 60,
                    _ => 1,
                };
                let steps = aligned((anchor - start).num_seconds() / unit, interval);
                if steps == 0 {
                    return;
                }
                let landed = start + Duration::seconds(steps * unit);
                self.set_date(landed.date());
                self.hour = i64::from(landed.hour());
                self.minute = i64::from(landed.minute());
                self.second = i64::from(landed.second());
                self.timeset = plan.period_timeset(self.hour, self.minute, self.second);
            }
        }

        tracing::trace!(year = self.year, month = self.month, day = self.day, "seek");
        if self.stop_at_max_year() {
            return;
        }
        self.rebuild();
    }

    fn set_date(&mut self, date: NaiveDate) {
        self.year = date.year();
        self.month = date.month();
        self.day = i64::from(date.day());
        self.weekday = date.weekday().num_days_from_monday();
    }

    fn finish(&mut self) {
        self.done = true;
        self.pending.clear();
    }

    /// Day-index range `[start, end)` of the current period.
    fn period_days(&self, info: &YearInfo) -> Option<(usize, usize)> {
        match self.plan.freq {
            Frequency::Yearly => Some((0, info.year_len)),
            Frequency::Monthly => Some(info.month_bounds(self.month)),
            freq => {
                let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day as u32)?;
                let start = info.index_of(date);
                if freq != Frequency::Weekly {
                    return Some((start, start + 1));
                }
                // Up to the next week start; the first week may be partial.
                let mut end = start;
                for _ in 0..7 {
                    end += 1;
                    if info.weekday_of(end as i64) == self.plan.wkst {
                        break;
                    }
                }
                Some((start, end))
            }
        }
    }

    /// Compute the candidates of the current period, then advance to the next
    /// one.
    fn expand_period(&mut self) {
        let Some(info) = self.info.as_ref() else {
            self.finish();
            return;
        };
        let Some((start, end)) = self.period_days(info) else {
            self.finish();
            return;
        };

        let mut filtered = false;
        let mut days = Vec::with_capacity(end - start);
        for i in start..end {
            if info.is_filtered(i, self.plan) {
                filtered = true;
            } else {
                days.push(i);
            }
        }

        let candidates: Vec<NaiveDateTime> = if !self.plan.by_set_pos.is_empty()
            && !self.timeset.is_empty()
        {
            select_positions(&self.plan.by_set_pos, &days, &self.timeset, info)
        } else {
            days.iter()
                .flat_map(|i| {
                    let date = info.date_of(*i);
                    self.timeset.iter().map(move |t| date.and_time(*t))
                })
                .collect()
        };

        if candidates.is_empty() {
            self.empty_periods += 1;
        } else {
            self.empty_periods = 0;
        }
        let (tz, policy) = (self.plan.tz, self.plan.dst_policy);
        self.pending
            .extend(candidates.into_iter().filter_map(|c| policy.resolve(&tz, c)));

        if self.empty_periods >= MAX_EMPTY_PERIODS {
            tracing::warn!(
                periods = self.empty_periods,
                year = self.year,
                "no candidate in consecutive periods, ending expansion"
            );
            self.done = true;
            return;
        }
        self.advance(filtered);
    }

    fn rebuild(&mut self) {
        let rebuilt = match self.info.as_mut() {
            Some(info) => info.rebuild(self.year, self.month, self.plan).is_some(),
            None => false,
        };
        if !rebuilt {
            self.done = true;
        }
    }

    fn stop_at_max_year(&mut self) -> bool {
        if self.year > MAX_YEAR {
            tracing::debug!(year = self.year, "expansion reached the year ceiling");
            self.done = true;
        }
        self.done
    }

    fn advance(&mut self, filtered: bool) {
        let plan = self.plan;
        let interval = plan.interval;
        let mut fix_day = false;

        match plan.freq {
            Frequency::Yearly => {
                self.year = self.year.saturating_add(interval.min(i64::from(MAX_YEAR)) as i32);
                if self.stop_at_max_year() {
                    return;
                }
                self.rebuild();
            }
            Frequency::Monthly => {
                let months = i64::from(self.year) * 12 + i64::from(self.month) - 1 + interval;
                self.year = months.div_euclid(12).min(i64::from(MAX_YEAR) + 1) as i32;
                self.month = months.rem_euclid(12) as u32 + 1;
                if self.stop_at_max_year() {
                    return;
                }
                self.rebuild();
            }
            Frequency::Weekly => {
                let weekday = i64::from(self.weekday);
                let wkst = i64::from(plan.wkst);
                self.day += if wkst > weekday {
                    -(weekday + 1 + (6 - wkst)) + interval * 7
                } else {
                    -(weekday - wkst) + interval * 7
                };
                self.weekday = plan.wkst;
                fix_day = true;
            }
            Frequency::Daily => {
                self.day += interval;
                fix_day = true;
            }
            Frequency::Hourly => {
                if filtered {
                    // Jump to the last step of the day.
                    self.hour += ((23 - self.hour) / interval) * interval;
                }
                let step = if plan.by_hour.is_empty() {
                    let next = self.hour + interval;
                    Some((next / 24, next % 24))
                } else {
                    plan.mod_distance(self.hour, &plan.by_hour, 24)
                };
                let Some((days, hour)) = step else {
                    self.done = true;
                    return;
                };
                self.hour = hour;
                if days > 0 {
                    self.day += days;
                    fix_day = true;
                }
                self.timeset = plan.hour_timeset(self.hour);
            }
            Frequency::Minutely => {
                if filtered {
                    self.minute +=
                        ((1439 - (self.hour * 60 + self.minute)) / interval) * interval;
                }
                let mut valid = false;
                for _ in 0..(1440 / gcd(interval, 1440)) {
                    let step = if plan.by_minute.is_empty() {
                        let next = self.minute + interval;
                        Some((next / 60, next % 60))
                    } else {
                        plan.mod_distance(self.minute, &plan.by_minute, 60)
                    };
                    let Some((hours, minute)) = step else { break };
                    self.minute = minute;
                    let total = self.hour + hours;
                    self.hour = total % 24;
                    if total >= 24 {
                        self.day += total / 24;
                        fix_day = true;
                    }
                    if plan.by_hour.is_empty() || plan.by_hour.contains(&(self.hour as u32)) {
                        valid = true;
                        break;
                    }
                }
                if !valid {
                    tracing::debug!("INTERVAL and BYHOUR never coincide, ending expansion");
                    self.done = true;
                    return;
                }
                self.timeset = plan.minute_timeset(self.hour, self.minute);
            }
            Frequency::Secondly => {
                if filtered {
                    let elapsed = self.hour * 3600 + self.minute * 60 + self.second;
                    self.second += ((86399 - elapsed) / interval) * interval;
                }
                let mut valid = false;
                for _ in 0..(86400 / gcd(interval, 86400)) {
                    let step = if plan.by_second.is_empty() {
                        let next = self.second + interval;
                        Some((next / 60, next % 60))
                    } else {
                        plan.mod_distance(self.second, &plan.by_second, 60)
                    };
                    let Some((minutes, second)) = step else { break };
                    self.second = second;
                    let total = self.minute + minutes;
                    self.minute = total % 60;
                    if total >= 60 {
                        let hours = self.hour + total / 60;
                        self.hour = hours % 24;
                        if hours >= 24 {
                            self.day += hours / 24;
                            fix_day = true;
                        }
                    }
                    if plan.time_matches(self.hour, self.minute, self.second) {
                        valid = true;
                        break;
                    }
                }
                if !valid {
                    tracing::debug!("INTERVAL and BYHOUR/BYMINUTE never coincide, ending expansion");
                    self.done = true;
                    return;
                }
                self.timeset = NaiveTime::from_hms_opt(
                    self.hour as u32,
                    self.minute as u32,
                    self.second as u32,
                )
                .into_iter()
                .collect();
            }
        }

        if fix_day && self.day > 28 {
            let mut month_len = i64::from(days_in_month(self.year, self.month));
            if self.day > month_len {
                while self.day > month_len {
                    self.day -= month_len;
                    self.month += 1;
                    if self.month == 13 {
                        self.month = 1;
                        self.year += 1;
                        if self.stop_at_max_year() {
                            return;
                        }
                    }
                    month_len = i64::from(days_in_month(self.year, self.month));
                }
                self.rebuild();
            }
        }
    }
}

/// Pick the BYSETPOS positions out of one period's candidates. Positions are
/// 1-based from the start or negative from the end, counted over the
/// day x time-of-day grid of the period.
fn select_positions(
    positions: &[i32],
    days: &[usize],
    timeset: &[NaiveTime],
    info: &YearInfo,
) -> Vec<NaiveDateTime> {
    let times = timeset.len() as i64;
    let mut picked: Vec<NaiveDateTime> = Vec::new();
    for &pos in positions {
        let pos = i64::from(pos);
        let flat = if pos < 0 { pos } else { pos - 1 };
        let (day_pos, time_pos) = (flat.div_euclid(times), flat.rem_euclid(times));
        let day_index = if day_pos < 0 {
            days.len() as i64 + day_pos
        } else {
            day_pos
        };
        if day_index < 0 || day_index >= days.len() as i64 {
            continue;
        }
        let candidate = info
            .date_of(days[day_index as usize])
            .and_time(timeset[time_pos as usize]);
        if !picked.contains(&candidate) {
            picked.push(candidate);
        }
    }
    picked.sort_unstable();
    picked
}

/// Largest multiple of `interval` not above `elapsed`.
fn aligned(elapsed: i64, interval: i64) -> i64 {
    elapsed.div_euclid(interval) * interval
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

impl Iterator for RuleIter<'_> {
    type Item = DateTime<Tz>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == Some(0) {
                self.finish();
                return None;
            }
            if let Some(candidate) = self.pending.pop_front() {
                if self.plan.until.is_some_and(|until| candidate > until) {
                    self.finish();
                    return None;
                }
                if candidate < self.plan.dtstart || self.last.is_some_and(|last| candidate <= last)
                {
                    continue;
                }
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                self.last = Some(candidate);
                return Some(candidate);
            }
            if self.done {
                return None;
            }
            self.expand_period();
        }
    }
}
