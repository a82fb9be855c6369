//! Textual grammar, serialize side.
//!
//! Output is canonical: rule keys always come out in the same order, fields
//! at their default are omitted, and list values keep the order the caller
//! gave them.

use std::fmt;

use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::options::{weekday_code, Options};
use crate::rule::Rule;
use crate::set::RuleSet;

const DATE_TIME: &str = "%Y%m%dT%H%M%S";

/// The value part of a DTSTART/RDATE/EXDATE line: `:YYYYMMDDTHHMMSSZ` for
/// UTC, `;TZID=zone:YYYYMMDDTHHMMSS` otherwise.
pub fn format_value(dt: &DateTime<Tz>) -> String {
    match dt.timezone() {
        Tz::UTC => format!(":{}Z", dt.format(DATE_TIME)),
        zone => format!(";TZID={}:{}", zone.name(), dt.format(DATE_TIME)),
    }
}

fn format_until(until: &DateTime<Tz>) -> String {
    format!("{}Z", until.with_timezone(&Utc).format(DATE_TIME))
}

fn join<T: fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// `KEY=VALUE;...` without an `RRULE:` prefix or DTSTART.
impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![format!("FREQ={}", self.freq)];
        if self.interval != 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }
        if self.wkst != Weekday::Mon {
            parts.push(format!("WKST={}", weekday_code(self.wkst)));
        }
        if let Some(count) = self.count {
            parts.push(format!("COUNT={count}"));
        }
        if let Some(until) = &self.until {
            parts.push(format!("UNTIL={}", format_until(until)));
        }

        let lists = [
            ("BYMONTH", join(&self.by_month)),
            ("BYMONTHDAY", join(&self.by_month_day)),
            ("BYYEARDAY", join(&self.by_year_day)),
            ("BYWEEKNO", join(&self.by_week_no)),
            ("BYDAY", join(&self.by_weekday)),
            ("BYHOUR", join(&self.by_hour)),
            ("BYMINUTE", join(&self.by_minute)),
            ("BYSECOND", join(&self.by_second)),
            ("BYEASTER", join(&self.by_easter)),
            ("BYSETPOS", join(&self.by_set_pos)),
        ];
        parts.extend(
            lists
                .into_iter()
                .filter(|(_, values)| !values.is_empty())
                .map(|(key, values)| format!("{key}={values}")),
        );
        f.write_str(&parts.join(";"))
    }
}

impl Rule {
    /// The rule parameters as supplied, without `RRULE:` or DTSTART.
    pub fn rrule_string(&self) -> String {
        self.original_options().to_string()
    }
}

/// `DTSTART…` (when the rule was given one) followed by `RRULE:…`.
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dtstart) = &self.original_options().dtstart {
            writeln!(f, "DTSTART{}", format_value(dtstart))?;
        }
        write!(f, "RRULE:{}", self.rrule_string())
    }
}

/// One property per line: DTSTART, RRULE, EXRULE, RDATE, EXDATE.
impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if let Some(dtstart) = &self.dtstart() {
            lines.push(format!("DTSTART{}", format_value(dtstart)));
        }
        lines.extend(self.rrules().iter().map(|r| format!("RRULE:{}", r.rrule_string())));
        lines.extend(self.exrules().iter().map(|r| format!("EXRULE:{}", r.rrule_string())));
        lines.extend(self.rdates().iter().map(|d| format!("RDATE{}", format_value(d))));
        lines.extend(self.exdates().iter().map(|d| format!("EXDATE{}", format_value(d))));
        f.write_str(&lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_values_use_z_suffix() {
        let dt = Tz::UTC.with_ymd_and_hms(2018, 2, 23, 10, 0, 0).unwrap();
        assert_eq!(format_value(&dt), ":20180223T100000Z");
    }

    #[test]
    fn zoned_values_carry_tzid() {
        let dt = Tz::Europe__Moscow
            .with_ymd_and_hms(2018, 2, 20, 9, 0, 0)
            .unwrap();
        assert_eq!(format_value(&dt), ";TZID=Europe/Moscow:20180220T090000");
    }

    #[test]
    fn until_is_always_utc() {
        let until = Tz::America__New_York
            .with_ymd_and_hms(2018, 5, 17, 19, 59, 59)
            .unwrap();
        assert_eq!(format_until(&until), "20180517T235959Z");
    }
}
