//! Textual grammar, parse side.
//!
//! Two shapes are accepted:
//!
//! - a single rule: `[RRULE:]KEY=VALUE;...`, optionally preceded by a
//!   `DTSTART` line. A bare one-line rule may also carry the legacy
//!   `DTSTART=<token>` key among its parameters.
//! - a set document: `DTSTART`, `RRULE`, `EXRULE`, `RDATE` and `EXDATE`
//!   lines, `DTSTART` first.
//!
//! Every entry point takes the zone used for local times that carry neither
//! `TZID` nor a trailing `Z`. Parsing is all-or-nothing.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::dst::DstPolicy;
use crate::error::{RecurError, Result};
use crate::options::{weekday_from_code, Frequency, NWeekday, Options};
use crate::rule::Rule;
use crate::set::RuleSet;

/// Look up an IANA zone name.
///
/// # Errors
/// Returns `RecurError::InvalidTimezone` for unknown or empty names.
pub fn resolve_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| RecurError::InvalidTimezone(name.to_string()))
}

/// Parse a start value: `[TZID=zone:]token`.
///
/// ```
/// use chrono_tz::Tz;
/// use recurrence_engine::parse_dtstart;
///
/// let dt = parse_dtstart("19970714T173000Z", Tz::America__New_York).unwrap();
/// assert_eq!(dt.timezone(), Tz::UTC);
/// ```
pub fn parse_dtstart(s: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let s = s.trim();
    match s.split_once(':') {
        Some((params, value)) => {
            let zone = value_zone(params, 1, tz)?;
            parse_single(value, 1, zone)
        }
        None => parse_token(s, 1, tz),
    }
}

/// Parse a date list value: `[params:]token[,token...]`, where params are
/// `VALUE=DATE`, `VALUE=DATE-TIME` or `TZID=zone`.
pub fn parse_dates(s: &str, tz: Tz) -> Result<Vec<DateTime<Tz>>> {
    let s = s.trim();
    match s.split_once(':') {
        Some((params, value)) => {
            let zone = value_zone(params, 1, tz)?;
            parse_token_list(value, 1, zone)
        }
        None => parse_token_list(s, 1, tz),
    }
}

/// Parse the options of a single rule without building the rule.
pub fn parse_options(s: &str, tz: Tz) -> Result<Options> {
    let text = s.trim();
    if text.is_empty() {
        return Err(RecurError::parse(1, "empty input"));
    }
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let options = match lines.as_slice() {
        [rule] => parse_rule_line(rule, 1, tz, None)?,
        [start, rule] => {
            let property = Property::split(start, 1)?;
            if property.name != "DTSTART" {
                return Err(RecurError::parse(
                    1,
                    format!("expected DTSTART, found {}", property.name),
                ));
            }
            let zone = value_zone(property.params, 1, tz)?;
            let dtstart = parse_single(property.value, 1, zone)?;
            parse_rule_line(rule, 2, dtstart.timezone(), Some(dtstart))?
        }
        _ => {
            return Err(RecurError::parse(
                3,
                "a single rule has at most a DTSTART line and an RRULE line",
            ))
        }
    };
    options.validate()?;
    Ok(options)
}

/// Parse and validate a single rule.
///
/// ```
/// use chrono_tz::Tz;
/// use recurrence_engine::parse_rule;
///
/// let rule = parse_rule("DTSTART:19970902T090000Z\nRRULE:FREQ=DAILY;COUNT=3", Tz::UTC).unwrap();
/// assert_eq!(rule.all().unwrap().len(), 3);
/// ```
pub fn parse_rule(s: &str, tz: Tz) -> Result<Rule> {
    Rule::new(parse_options(s, tz)?)
}

/// Parse a set document.
///
/// # Errors
/// Fails on empty input, on any malformed line, and on a `DTSTART` line that
/// is not the first line.
pub fn parse_set(s: &str, tz: Tz) -> Result<RuleSet> {
    if s.trim().is_empty() {
        return Err(RecurError::parse(1, "empty input"));
    }
    let lines: Vec<&str> = s.lines().collect();
    parse_set_lines(&lines, tz)
}

/// Parse a set document already split into lines. Blank lines are skipped;
/// an empty slice is an empty set.
pub fn parse_set_lines<S: AsRef<str>>(lines: &[S], tz: Tz) -> Result<RuleSet> {
    let mut set = RuleSet::new();
    let mut zone = tz;
    let mut first = true;

    for (index, raw) in lines.iter().enumerate() {
        let line_no = index + 1;
        let line = raw.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        let property = Property::split(line, line_no)?;
        tracing::trace!(line = line_no, property = %property.name, "set line");

        match property.name.as_str() {
            "DTSTART" => {
                if !first {
                    return Err(RecurError::parse(line_no, "DTSTART must be the first line"));
                }
                let value_tz = value_zone(property.params, line_no, zone)?;
                let dtstart = parse_single(property.value, line_no, value_tz)?;
                zone = dtstart.timezone();
                set.set_dtstart(dtstart);
            }
            "RRULE" | "EXRULE" => {
                property.reject_params(line_no)?;
                let options = parse_params(property.value, line_no, zone, set.dtstart(), false)?;
                let rule = Rule::new(options)?;
                if property.name == "RRULE" {
                    set.add_rrule(rule);
                } else {
                    set.add_exrule(rule);
                }
            }
            "RDATE" | "EXDATE" => {
                let value_tz = value_zone(property.params, line_no, zone)?;
                for dt in parse_token_list(property.value, line_no, value_tz)? {
                    if property.name == "RDATE" {
                        set.add_rdate(dt);
                    } else {
                        set.add_exdate(dt);
                    }
                }
            }
            other => {
                return Err(RecurError::parse(
                    line_no,
                    format!("unknown property '{other}'"),
                ))
            }
        }
        first = false;
    }
    Ok(set)
}

impl FromStr for Rule {
    type Err = RecurError;

    /// Parse a single rule; local times default to UTC.
    fn from_str(s: &str) -> Result<Self> {
        parse_rule(s, Tz::UTC)
    }
}

impl FromStr for RuleSet {
    type Err = RecurError;

    /// Parse a set document; local times default to UTC.
    fn from_str(s: &str) -> Result<Self> {
        parse_set(s, Tz::UTC)
    }
}

/// A content line split into `NAME[;params]:value`.
struct Property<'a> {
    name: String,
    params: &'a str,
    value: &'a str,
}

impl<'a> Property<'a> {
    fn split(line: &'a str, line_no: usize) -> Result<Self> {
        let head_end = line
            .find([';', ':'])
            .ok_or_else(|| RecurError::parse(line_no, format!("missing ':' in '{line}'")))?;
        let name = &line[..head_end];
        if name.is_empty() || name.contains('=') {
            return Err(RecurError::parse(
                line_no,
                format!("missing property name in '{line}'"),
            ));
        }
        let rest = &line[head_end..];
        let (params, value) = match rest.strip_prefix(';') {
            Some(rest) => {
                let (params, value) = rest.split_once(':').ok_or_else(|| {
                    RecurError::parse(line_no, format!("missing ':' in '{line}'"))
                })?;
                if params.is_empty() {
                    return Err(RecurError::parse(line_no, "empty property parameters"));
                }
                (params, value)
            }
            None => ("", &rest[1..]),
        };
        Ok(Property {
            name: name.to_ascii_uppercase(),
            params,
            value,
        })
    }

    fn reject_params(&self, line_no: usize) -> Result<()> {
        if self.params.is_empty() {
            Ok(())
        } else {
            Err(RecurError::parse(
                line_no,
                format!("{} takes no parameters", self.name),
            ))
        }
    }
}

/// True when `line` starts with a property name rather than a rule parameter.
fn has_property_name(line: &str) -> bool {
    match line.find([';', ':']) {
        Some(end) => !line[..end].contains('='),
        None => false,
    }
}

fn parse_rule_line(
    line: &str,
    line_no: usize,
    tz: Tz,
    dtstart: Option<DateTime<Tz>>,
) -> Result<Options> {
    if !has_property_name(line) {
        // Bare parameters; the legacy DTSTART key is only allowed when no
        // DTSTART line precedes the rule.
        return parse_params(line, line_no, tz, dtstart, dtstart.is_none());
    }
    let property = Property::split(line, line_no)?;
    if property.name != "RRULE" {
        return Err(RecurError::parse(
            line_no,
            format!("expected RRULE, found {}", property.name),
        ));
    }
    property.reject_params(line_no)?;
    parse_params(property.value, line_no, tz, dtstart, false)
}

/// Parse `KEY=VALUE;...` rule parameters. Keys are case-insensitive and may
/// appear at most once.
fn parse_params(
    params: &str,
    line_no: usize,
    tz: Tz,
    dtstart: Option<DateTime<Tz>>,
    allow_dtstart_key: bool,
) -> Result<Options> {
    tracing::trace!(line = line_no, params, "rule parameters");
    let mut options = Options::new(Frequency::Yearly);
    let mut freq = None;
    let mut until = None;
    let mut legacy_start = None;
    let mut seen: Vec<String> = Vec::new();

    for part in params.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part.split_once('=').ok_or_else(|| {
            RecurError::parse(line_no, format!("missing '=' in '{part}'"))
        })?;
        let key = match key.trim().to_ascii_uppercase().as_str() {
            "BYWEEKDAY" => "BYDAY".to_string(),
            other => other.to_string(),
        };
        let value = value.trim();
        if value.is_empty() {
            return Err(RecurError::parse(line_no, format!("empty value for {key}")));
        }
        if seen.contains(&key) {
            return Err(RecurError::parse(line_no, format!("duplicate key {key}")));
        }

        match key.as_str() {
            "FREQ" => freq = Some(value.parse::<Frequency>().map_err(|e| at_line(e, line_no))?),
            "INTERVAL" => options.interval = number(&key, value, line_no)?,
            "COUNT" => options.count = Some(number(&key, value, line_no)?),
            "WKST" => {
                options.wkst = weekday_from_code(value).ok_or_else(|| {
                    RecurError::parse(line_no, format!("invalid WKST '{value}'"))
                })?;
            }
            "UNTIL" => until = Some(value),
            "DTSTART" if allow_dtstart_key => legacy_start = Some(parse_token(value, line_no, tz)?),
            "BYSETPOS" => options.by_set_pos = list(&key, value, line_no)?,
            "BYMONTH" => options.by_month = list(&key, value, line_no)?,
            "BYMONTHDAY" => options.by_month_day = list(&key, value, line_no)?,
            "BYYEARDAY" => options.by_year_day = list(&key, value, line_no)?,
            "BYWEEKNO" => options.by_week_no = list(&key, value, line_no)?,
            "BYHOUR" => options.by_hour = list(&key, value, line_no)?,
            "BYMINUTE" => options.by_minute = list(&key, value, line_no)?,
            "BYSECOND" => options.by_second = list(&key, value, line_no)?,
            "BYEASTER" => options.by_easter = list(&key, value, line_no)?,
            "BYDAY" => {
                options.by_weekday = value
                    .split(',')
                    .map(|token| token.trim().parse::<NWeekday>())
                    .collect::<Result<_>>()
                    .map_err(|e| at_line(e, line_no))?;
            }
            _ => return Err(RecurError::parse(line_no, format!("unknown key {key}"))),
        }
        seen.push(key);
    }

    options.freq = freq.ok_or_else(|| RecurError::parse(line_no, "missing FREQ"))?;
    options.dtstart = dtstart.or(legacy_start);
    if let Some(until) = until {
        // A local UNTIL is read in the DTSTART zone.
        let zone = options.dtstart.map_or(tz, |dt| dt.timezone());
        options.until = Some(parse_token(until, line_no, zone)?);
    }
    Ok(options)
}

fn number<T: FromStr>(key: &str, value: &str, line_no: usize) -> Result<T> {
    value
        .parse()
        .map_err(|_| RecurError::parse(line_no, format!("invalid {key} value '{value}'")))
}

fn list<T: FromStr>(key: &str, value: &str, line_no: usize) -> Result<Vec<T>> {
    value
        .split(',')
        .map(|item| number(key, item.trim(), line_no))
        .collect()
}

fn at_line(err: RecurError, line_no: usize) -> RecurError {
    match err {
        RecurError::Parse { message, .. } => RecurError::Parse {
            line: line_no,
            message,
        },
        other => other,
    }
}

/// Zone selected by value parameters (`TZID`, `VALUE`), falling back to
/// `default`.
fn value_zone(params: &str, line_no: usize, default: Tz) -> Result<Tz> {
    let mut zone = default;
    if params.is_empty() {
        return Ok(zone);
    }
    for param in params.split(';') {
        let (key, value) = param.split_once('=').ok_or_else(|| {
            RecurError::parse(line_no, format!("invalid parameter '{param}'"))
        })?;
        match key.trim().to_ascii_uppercase().as_str() {
            "TZID" => zone = resolve_timezone(value.trim())?,
            "VALUE" => match value.trim().to_ascii_uppercase().as_str() {
                "DATE" | "DATE-TIME" => {}
                other => {
                    return Err(RecurError::parse(
                        line_no,
                        format!("unsupported VALUE type '{other}'"),
                    ))
                }
            },
            other => {
                return Err(RecurError::parse(
                    line_no,
                    format!("unknown parameter '{other}'"),
                ))
            }
        }
    }
    Ok(zone)
}

fn parse_single(value: &str, line_no: usize, tz: Tz) -> Result<DateTime<Tz>> {
    if value.contains(',') {
        return Err(RecurError::parse(line_no, "expected a single date-time"));
    }
    parse_token(value.trim(), line_no, tz)
}

fn parse_token_list(value: &str, line_no: usize, tz: Tz) -> Result<Vec<DateTime<Tz>>> {
    value
        .split(',')
        .map(|token| parse_token(token.trim(), line_no, tz))
        .collect()
}

/// Parse `YYYYMMDD`, `YYYYMMDDTHHMMSS` or `YYYYMMDDTHHMMSSZ`. A trailing `Z`
/// wins over `tz`.
fn parse_token(token: &str, line_no: usize, tz: Tz) -> Result<DateTime<Tz>> {
    let invalid = || RecurError::parse(line_no, format!("invalid date-time '{token}'"));
    if !token.is_ascii() {
        return Err(invalid());
    }
    let digits_ok = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

    let (naive, zone) = match token.len() {
        8 if digits_ok(token) => {
            let date = NaiveDate::parse_from_str(token, "%Y%m%d").map_err(|_| invalid())?;
            (date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?, tz)
        }
        15 | 16 => {
            let utc = token.strip_suffix('Z').or_else(|| token.strip_suffix('z'));
            let (local, zone) = match utc {
                Some(local) => (local, Tz::UTC),
                None => (token, tz),
            };
            if local.len() != 15
                || !digits_ok(&local[..8])
                || !local[8..9].eq_ignore_ascii_case("T")
                || !digits_ok(&local[9..])
            {
                return Err(invalid());
            }
            let normalized = format!("{}T{}", &local[..8], &local[9..]);
            let naive = NaiveDateTime::parse_from_str(&normalized, "%Y%m%dT%H%M%S")
                .map_err(|_| invalid())?;
            (naive, zone)
        }
        _ => return Err(invalid()),
    };

    if zone == Tz::UTC {
        return Ok(Tz::UTC.from_utc_datetime(&naive));
    }
    DstPolicy::WallClock
        .resolve(&zone, naive)
        .ok_or_else(invalid)
}
