//! Recurrence options -- the typed form of an RRULE, its validation, and the
//! RFC 5545 defaulting that turns caller input into complete expansion data.
//!
//! Two copies of [`Options`] travel with every [`Rule`](crate::Rule): the
//! caller's original (used for serialization) and a normalized copy in which
//! every BY-field needed to pin down a day and a time-of-day is populated.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, SubsecRound, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{RecurError, Result};

/// Recurrence frequency, ordered from the coarsest period to the finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    Minutely,
    Secondly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Yearly => "YEARLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Daily => "DAILY",
            Frequency::Hourly => "HOURLY",
            Frequency::Minutely => "MINUTELY",
            Frequency::Secondly => "SECONDLY",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = RecurError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "YEARLY" => Ok(Frequency::Yearly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "WEEKLY" => Ok(Frequency::Weekly),
            "DAILY" => Ok(Frequency::Daily),
            "HOURLY" => Ok(Frequency::Hourly),
            "MINUTELY" => Ok(Frequency::Minutely),
            "SECONDLY" => Ok(Frequency::Secondly),
            other => Err(RecurError::parse(1, format!("unknown frequency '{other}'"))),
        }
    }
}

/// Two-letter RFC 5545 weekday code.
pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// Inverse of [`weekday_code`]; case-insensitive.
pub fn weekday_from_code(code: &str) -> Option<Weekday> {
    match code.to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

/// A BYDAY entry: a weekday, optionally restricted to its nth occurrence in
/// the period (negative counts from the end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NWeekday {
    /// Every occurrence of the weekday in the period.
    Every(Weekday),
    /// The nth occurrence; `Nth(-1, Weekday::Mon)` is the last Monday.
    Nth(i32, Weekday),
}

impl NWeekday {
    pub fn weekday(self) -> Weekday {
        match self {
            NWeekday::Every(day) | NWeekday::Nth(_, day) => day,
        }
    }

    /// Signed ordinal, 0 for [`NWeekday::Every`].
    pub fn n(self) -> i32 {
        match self {
            NWeekday::Every(_) => 0,
            NWeekday::Nth(n, _) => n,
        }
    }
}

impl From<Weekday> for NWeekday {
    fn from(day: Weekday) -> Self {
        NWeekday::Every(day)
    }
}

impl fmt::Display for NWeekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NWeekday::Every(day) => f.write_str(weekday_code(*day)),
            NWeekday::Nth(n, day) => write!(f, "{n:+}{}", weekday_code(*day)),
        }
    }
}

impl FromStr for NWeekday {
    type Err = RecurError;

    /// Accepts `MO`, `+2FR`, `-1SU`. An ordinal must carry an explicit sign
    /// and at least one digit, so `2MO` and `+MO` are rejected.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RecurError::parse(1, format!("invalid weekday '{s}'"));
        if s.len() < 2 || !s.is_ascii() {
            return Err(invalid());
        }
        let (ordinal, code) = s.split_at(s.len() - 2);
        let day = weekday_from_code(code).ok_or_else(invalid)?;
        if ordinal.is_empty() {
            return Ok(NWeekday::Every(day));
        }
        let digits = ordinal
            .strip_prefix('+')
            .or_else(|| ordinal.strip_prefix('-'))
            .ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let n: i32 = ordinal.parse().map_err(|_| invalid())?;
        Ok(NWeekday::Nth(n, day))
    }
}

/// A recurrence specification.
///
/// Empty BY-vectors mean "not set". Values are kept in the order the caller
/// supplied them; the normalized copy held by a rule is sorted and
/// deduplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub freq: Frequency,
    /// Anchor instant. `None` anchors the rule at construction time.
    pub dtstart: Option<DateTime<Tz>>,
    pub interval: u32,
    pub wkst: Weekday,
    pub count: Option<u32>,
    pub until: Option<DateTime<Tz>>,
    pub by_set_pos: Vec<i32>,
    pub by_month: Vec<u32>,
    pub by_month_day: Vec<i32>,
    pub by_year_day: Vec<i32>,
    pub by_week_no: Vec<i32>,
    pub by_weekday: Vec<NWeekday>,
    pub by_hour: Vec<u32>,
    pub by_minute: Vec<u32>,
    pub by_second: Vec<u32>,
    /// Day offsets from Easter Sunday (non-standard extension).
    pub by_easter: Vec<i32>,
}

impl Options {
    pub fn new(freq: Frequency) -> Self {
        Options {
            freq,
            dtstart: None,
            interval: 1,
            wkst: Weekday::Mon,
            count: None,
            until: None,
            by_set_pos: Vec::new(),
            by_month: Vec::new(),
            by_month_day: Vec::new(),
            by_year_day: Vec::new(),
            by_week_no: Vec::new(),
            by_weekday: Vec::new(),
            by_hour: Vec::new(),
            by_minute: Vec::new(),
            by_second: Vec::new(),
            by_easter: Vec::new(),
        }
    }

    pub fn dtstart(mut self, dtstart: DateTime<Tz>) -> Self {
        self.dtstart = Some(dtstart);
        self
    }

    pub fn interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn wkst(mut self, wkst: Weekday) -> Self {
        self.wkst = wkst;
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn until(mut self, until: DateTime<Tz>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn by_set_pos(mut self, values: impl IntoIterator<Item = i32>) -> Self {
        self.by_set_pos = values.into_iter().collect();
        self
    }

    pub fn by_month(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.by_month = values.into_iter().collect();
        self
    }

    pub fn by_month_day(mut self, values: impl IntoIterator<Item = i32>) -> Self {
        self.by_month_day = values.into_iter().collect();
        self
    }

    pub fn by_year_day(mut self, values: impl IntoIterator<Item = i32>) -> Self {
        self.by_year_day = values.into_iter().collect();
        self
    }

    pub fn by_week_no(mut self, values: impl IntoIterator<Item = i32>) -> Self {
        self.by_week_no = values.into_iter().collect();
        self
    }

    pub fn by_weekday<W: Into<NWeekday>>(mut self, values: impl IntoIterator<Item = W>) -> Self {
        self.by_weekday = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn by_hour(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.by_hour = values.into_iter().collect();
        self
    }

    pub fn by_minute(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.by_minute = values.into_iter().collect();
        self
    }

    pub fn by_second(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.by_second = values.into_iter().collect();
        self
    }

    pub fn by_easter(mut self, values: impl IntoIterator<Item = i32>) -> Self {
        self.by_easter = values.into_iter().collect();
        self
    }

    /// Check every field against its RFC 5545 range.
    ///
    /// This is the single rule-checking routine behind both [`Rule::new`] and
    /// the text parser.
    ///
    /// [`Rule::new`]: crate::Rule::new
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(RecurError::validation("INTERVAL", "must be at least 1"));
        }
        check_range("BYMONTH", &self.by_month, 1, 12)?;
        check_signed("BYMONTHDAY", &self.by_month_day, 31)?;
        check_signed("BYYEARDAY", &self.by_year_day, 366)?;
        check_signed("BYWEEKNO", &self.by_week_no, 53)?;
        check_signed("BYSETPOS", &self.by_set_pos, 366)?;
        check_range("BYHOUR", &self.by_hour, 0, 23)?;
        check_range("BYMINUTE", &self.by_minute, 0, 59)?;
        check_range("BYSECOND", &self.by_second, 0, 59)?;
        for offset in &self.by_easter {
            if !(-366..=366).contains(offset) {
                return Err(RecurError::validation(
                    "BYEASTER",
                    format!("{offset} is outside -366..=366"),
                ));
            }
        }
        for day in &self.by_weekday {
            if let NWeekday::Nth(n, _) = day {
                if *n == 0 || !(-53..=53).contains(n) {
                    return Err(RecurError::validation(
                        "BYDAY",
                        format!("ordinal {n} must be non-zero and within -53..=53"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Fill in RFC 5545 defaults. `self` must already be valid.
    ///
    /// The returned copy has a DTSTART (truncated to whole seconds), an UNTIL
    /// expressed in the DTSTART zone, sorted and deduplicated BY-fields, and
    /// enough BY-data to fix a day and time-of-day for `freq`. The resolved
    /// DTSTART is returned alongside.
    pub(crate) fn normalized(&self) -> (Options, DateTime<Tz>) {
        let dtstart = self
            .dtstart
            .unwrap_or_else(|| Utc::now().with_timezone(&Tz::UTC))
            .trunc_subsecs(0);
        let tz = dtstart.timezone();

        let mut out = self.clone();
        out.dtstart = Some(dtstart);
        out.until = self.until.map(|until| until.with_timezone(&tz));

        let no_day_filter = out.by_week_no.is_empty()
            && out.by_year_day.is_empty()
            && out.by_month_day.is_empty()
            && out.by_weekday.is_empty()
            && out.by_easter.is_empty();
        if no_day_filter {
            match out.freq {
                Frequency::Yearly => {
                    if out.by_month.is_empty() {
                        out.by_month = vec![dtstart.month()];
                    }
                    out.by_month_day = vec![dtstart.day() as i32];
                }
                Frequency::Monthly => out.by_month_day = vec![dtstart.day() as i32],
                Frequency::Weekly => out.by_weekday = vec![NWeekday::Every(dtstart.weekday())],
                _ => {}
            }
        }

        if out.by_hour.is_empty() && out.freq < Frequency::Hourly {
            out.by_hour = vec![dtstart.hour()];
        }
        if out.by_minute.is_empty() && out.freq < Frequency::Minutely {
            out.by_minute = vec![dtstart.minute()];
        }
        if out.by_second.is_empty() && out.freq < Frequency::Secondly {
            out.by_second = vec![dtstart.second()];
        }

        sort_unique(&mut out.by_set_pos);
        sort_unique(&mut out.by_month);
        sort_unique(&mut out.by_month_day);
        sort_unique(&mut out.by_year_day);
        sort_unique(&mut out.by_week_no);
        sort_unique(&mut out.by_hour);
        sort_unique(&mut out.by_minute);
        sort_unique(&mut out.by_second);
        sort_unique(&mut out.by_easter);
        out.by_weekday
            .sort_by_key(|day| (day.weekday().num_days_from_monday(), day.n()));
        out.by_weekday.dedup();
        (out, dtstart)
    }
}

fn check_range(field: &'static str, values: &[u32], min: u32, max: u32) -> Result<()> {
    match values.iter().find(|v| !(min..=max).contains(*v)) {
        Some(v) => Err(RecurError::validation(
            field,
            format!("{v} is outside {min}..={max}"),
        )),
        None => Ok(()),
    }
}

fn check_signed(field: &'static str, values: &[i32], max: i32) -> Result<()> {
    match values.iter().find(|v| **v == 0 || !(-max..=max).contains(*v)) {
        Some(v) => Err(RecurError::validation(
            field,
            format!("{v} must be non-zero and within -{max}..={max}"),
        )),
        None => Ok(()),
    }
}

fn sort_unique<T: Ord>(values: &mut Vec<T>) {
    values.sort_unstable();
    values.dedup();
}
