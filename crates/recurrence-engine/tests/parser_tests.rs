//! Text grammar, parse side: single rules, set documents and date values.

use chrono::{DateTime, TimeZone, Weekday};
use chrono_tz::Tz;
use recurrence_engine::{
    parse_dates, parse_dtstart, parse_options, parse_rule, parse_set, parse_set_lines,
    Frequency, NWeekday, RecurError, Rule, RuleSet,
};

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Tz> {
    Tz::UTC.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

// ---------------------------------------------------------------------------
// Single rules
// ---------------------------------------------------------------------------

#[test]
fn invalid_rule_strings_are_rejected() {
    let cases = [
        "",
        "    ",
        "FREQ",
        "FREQ=HELLO",
        "BYMONTH=",
        "FREQ=WEEKLY;HELLO=WORLD",
        "FREQ=WEEKLY;BYMONTHDAY=I",
        "FREQ=WEEKLY;BYDAY=M",
        "FREQ=WEEKLY;BYDAY=MQ",
        "FREQ=WEEKLY;BYDAY=+MO",
        "FREQ=MONTHLY;BYDAY=2MO",
        "BYDAY=MO",
        "FREQ=DAILY;COUNT=-1",
        "FREQ=DAILY;INTERVAL=0",
        "FREQ=DAILY;FREQ=WEEKLY",
        "FREQ=DAILY;BYHOUR=24",
        "FREQ=DAILY;WKST=XX",
        "FREQ=DAILY;UNTIL=1997",
        "EXRULE:FREQ=DAILY",
        "RRULE;X=Y:FREQ=DAILY",
        "DTSTART:19970902T090000Z",
        "DTSTART:19970902T090000Z\nRRULE:FREQ=DAILY\nRRULE:FREQ=WEEKLY",
        "DTSTART:19970902T090000Z\nRRULE:FREQ=DAILY;DTSTART=19970902T090000Z",
    ];
    for case in cases {
        assert!(case.parse::<Rule>().is_err(), "{case:?} should be rejected");
    }
}

#[test]
fn out_of_range_values_report_the_field() {
    let err = "FREQ=YEARLY;BYMONTH=13".parse::<Rule>().unwrap_err();
    assert!(matches!(err, RecurError::Validation { field: "BYMONTH", .. }));
}

#[test]
fn parse_errors_carry_the_line() {
    let err = parse_rule("DTSTART:19970902T090000Z\nRRULE:FREQ=DAILY;NOPE=1", Tz::UTC)
        .unwrap_err();
    assert!(matches!(err, RecurError::Parse { line: 2, .. }), "{err:?}");
}

#[test]
fn keys_are_case_insensitive() {
    let options = parse_options("freq=weekly;byday=mo,+2fr;Count=3", Tz::UTC).unwrap();
    assert_eq!(options.freq, Frequency::Weekly);
    assert_eq!(options.count, Some(3));
    assert_eq!(
        options.by_weekday,
        vec![NWeekday::Every(Weekday::Mon), NWeekday::Nth(2, Weekday::Fri)]
    );
}

#[test]
fn byweekday_is_an_alias_of_byday() {
    let options = parse_options("FREQ=WEEKLY;BYWEEKDAY=TU", Tz::UTC).unwrap();
    assert_eq!(options.by_weekday, vec![NWeekday::Every(Weekday::Tue)]);
    assert!(parse_options("FREQ=WEEKLY;BYWEEKDAY=TU;BYDAY=WE", Tz::UTC).is_err());
}

#[test]
fn rrule_prefix_is_optional() {
    let bare = parse_options("FREQ=DAILY;COUNT=2", Tz::UTC).unwrap();
    let prefixed = parse_options("RRULE:FREQ=DAILY;COUNT=2", Tz::UTC).unwrap();
    assert_eq!(bare, prefixed);
    assert_eq!(bare.dtstart, None);
}

#[test]
fn legacy_dtstart_key_in_bare_rule() {
    let rule = parse_rule("FREQ=DAILY;DTSTART=19970902T090000Z;COUNT=2", Tz::UTC).unwrap();
    assert_eq!(rule.dtstart(), utc(1997, 9, 2, 9, 0, 0));
    assert_eq!(rule.all().unwrap().len(), 2);
}

#[test]
fn dtstart_line_sets_anchor_and_zone() {
    let rule = parse_rule(
        "DTSTART;TZID=America/New_York:20180101T090000\nRRULE:FREQ=MONTHLY;COUNT=2",
        Tz::UTC,
    )
    .unwrap();
    let ny = Tz::America__New_York;
    assert_eq!(rule.timezone(), ny);
    assert_eq!(
        rule.all().unwrap(),
        vec![
            ny.with_ymd_and_hms(2018, 1, 1, 9, 0, 0).unwrap(),
            ny.with_ymd_and_hms(2018, 2, 1, 9, 0, 0).unwrap()
        ]
    );
}

#[test]
fn local_until_uses_dtstart_zone() {
    let rule = parse_rule(
        "DTSTART;TZID=Asia/Bangkok:20240521T114100\nRRULE:FREQ=WEEKLY;UNTIL=20240521T114200;WKST=MO",
        Tz::UTC,
    )
    .unwrap();
    let bangkok = Tz::Asia__Bangkok;
    assert_eq!(
        rule.until(),
        Some(bangkok.with_ymd_and_hms(2024, 5, 21, 11, 42, 0).unwrap())
    );
    assert_eq!(rule.all().unwrap().len(), 1);
}

#[test]
fn local_times_use_the_default_zone() {
    let tokyo = Tz::Asia__Tokyo;
    let rule = parse_rule("DTSTART:20240101T090000\nRRULE:FREQ=DAILY;COUNT=1", tokyo).unwrap();
    assert_eq!(rule.dtstart(), tokyo.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
}

#[test]
fn date_only_until() {
    let rule = parse_rule("DTSTART:19970902T090000Z\nRRULE:FREQ=DAILY;UNTIL=19970905", Tz::UTC)
        .unwrap();
    // UNTIL is midnight on the 5th, so the 5th at 09:00 is out.
    assert_eq!(rule.all().unwrap().len(), 3);
}

// ---------------------------------------------------------------------------
// Date values
// ---------------------------------------------------------------------------

#[test]
fn dtstart_values() {
    assert_eq!(
        parse_dtstart("19970714T173000Z", Tz::UTC).unwrap(),
        utc(1997, 7, 14, 17, 30, 0)
    );
    let local = parse_dtstart("19970714T133000", Tz::Europe__Paris).unwrap();
    assert_eq!(local.timezone(), Tz::Europe__Paris);
    let ny = parse_dtstart("TZID=America/New_York:19970714T133000", Tz::UTC).unwrap();
    assert_eq!(ny, utc(1997, 7, 14, 17, 30, 0));
}

#[test]
fn invalid_dtstart_values() {
    let cases = [
        "DTSTART;TZID=America/New_York:19970714T133000",
        "19970714T1330000",
        "DTSTART;TZID=:20180101T090000",
        "TZID=:20180101T090000",
        "DTSTART:19970714T133000",
        "DTSTART:19970714T133000Z",
        "DTSTART;:19970714T133000Z",
        "DTSTART;:1997:07:14T13:30:00Z",
        ";:19970714T133000Z",
        "    ",
        "",
    ];
    for case in cases {
        assert!(parse_dtstart(case, Tz::UTC).is_err(), "{case:?} should be rejected");
    }
}

#[test]
fn unknown_timezone_is_its_own_error() {
    let err = parse_dtstart("TZID=notatimezone:20180101T090000", Tz::UTC).unwrap_err();
    assert_eq!(err, RecurError::InvalidTimezone("notatimezone".to_string()));
}

#[test]
fn date_lists() {
    let valid = [
        "19970714T133000",
        "19970714T173000Z",
        "VALUE=DATE-TIME:19970714T133000,19980714T133000,19980714T133000",
        "VALUE=DATE-TIME;TZID=America/New_York:19970714T133000,19980714T133000",
        "VALUE=DATE:19970714,19980714",
    ];
    for case in valid {
        assert!(parse_dates(case, Tz::UTC).is_ok(), "{case:?} should parse");
    }
    let invalid = [
        "VALUE:DATE:TIME:19970714T133000,19980714T133000",
        ";:19970714T133000Z",
        "    ",
        "",
        "VALUE=DATE-TIME;TZID=:19970714T133000",
        "VALUE=PERIOD:19970714T133000Z/19980714T133000Z",
        "19970714T133000,",
    ];
    for case in invalid {
        assert!(parse_dates(case, Tz::UTC).is_err(), "{case:?} should be rejected");
    }
}

#[test]
fn date_values_resolve_zones() {
    let dates = parse_dates("VALUE=DATE-TIME:19970714T133000", Tz::UTC).unwrap();
    assert_eq!(dates, vec![utc(1997, 7, 14, 13, 30, 0)]);

    let ny = Tz::America__New_York;
    let dates = parse_dates("VALUE=DATE-TIME;TZID=America/New_York:19970714T133000", Tz::UTC)
        .unwrap();
    assert_eq!(dates, vec![ny.with_ymd_and_hms(1997, 7, 14, 13, 30, 0).unwrap()]);

    // A trailing Z wins over TZID.
    let dates = parse_dates("TZID=America/New_York:19970714T133000Z", Tz::UTC).unwrap();
    assert_eq!(dates[0].timezone(), Tz::UTC);

    let denver = Tz::America__Denver;
    let dates = parse_dates("VALUE=DATE;TZID=America/Denver:20180223", Tz::UTC).unwrap();
    assert_eq!(dates, vec![denver.with_ymd_and_hms(2018, 2, 23, 0, 0, 0).unwrap()]);
}

// ---------------------------------------------------------------------------
// Sets
// ---------------------------------------------------------------------------

#[test]
fn set_document() {
    let text = "RRULE:FREQ=DAILY;UNTIL=20180517T235959Z\n\
                EXDATE;VALUE=DATE-TIME:20180525T070000Z,20180530T130000Z\n\
                RDATE;VALUE=DATE-TIME:20180801T131313Z,20180902T141414Z\n";
    let set: RuleSet = text.parse().unwrap();
    assert_eq!(
        set.rrule().unwrap().rrule_string(),
        "FREQ=DAILY;UNTIL=20180517T235959Z"
    );
    assert_eq!(
        set.exdates(),
        &[utc(2018, 5, 25, 7, 0, 0), utc(2018, 5, 30, 13, 0, 0)]
    );
    assert_eq!(
        set.rdates(),
        &[utc(2018, 8, 1, 13, 13, 13), utc(2018, 9, 2, 14, 14, 14)]
    );
}

#[test]
fn set_document_with_dtstart() {
    let text = "DTSTART;TZID=America/New_York:20180101T090000\n\
                RRULE:FREQ=DAILY;UNTIL=20180517T235959Z\n\
                RRULE:FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,TU\n\
                EXRULE:FREQ=MONTHLY;UNTIL=20180520;BYMONTHDAY=1,2,3\n\
                EXDATE;VALUE=DATE-TIME:20180525T070000Z,20180530T130000Z\n\
                RDATE;VALUE=DATE-TIME:20180801T131313Z,20180902T141414Z\n";
    let set = parse_set(text, Tz::UTC).unwrap();
    let ny = Tz::America__New_York;
    let start = ny.with_ymd_and_hms(2018, 1, 1, 9, 0, 0).unwrap();

    assert_eq!(set.dtstart(), Some(start));
    assert_eq!(set.rrules().len(), 2);
    assert_eq!(set.exrules().len(), 1);
    for rule in set.rrules().iter().chain(set.exrules()) {
        assert_eq!(rule.dtstart(), start);
    }
    // Jan 1-3 are excluded by the EXRULE.
    assert_eq!(
        set.after(start, true),
        Some(ny.with_ymd_and_hms(2018, 1, 4, 9, 0, 0).unwrap())
    );

    let text = set.to_string();
    assert_eq!(parse_set(&text, Tz::UTC).unwrap().to_string(), text);
}

#[test]
fn set_local_times_use_the_dtstart_zone() {
    let moscow = Tz::Europe__Moscow;
    let lines = [
        "DTSTART;TZID=Europe/Moscow:20180220T090000",
        "RDATE;VALUE=DATE-TIME:20180223T100000",
    ];
    let set = parse_set_lines(&lines, Tz::UTC).unwrap();
    assert_eq!(
        set.rdates()[0],
        moscow.with_ymd_and_hms(2018, 2, 23, 10, 0, 0).unwrap()
    );
}

#[test]
fn set_local_times_default_zone() {
    let moscow = Tz::Europe__Moscow;
    let set = parse_set_lines(&["RDATE;VALUE=DATE-TIME:20180223T100000"], moscow).unwrap();
    assert_eq!(
        set.rdates()[0],
        moscow.with_ymd_and_hms(2018, 2, 23, 10, 0, 0).unwrap()
    );
    let set = parse_set_lines(&["RDATE;VALUE=DATE:20180223"], Tz::UTC).unwrap();
    assert_eq!(set.rdates()[0], utc(2018, 2, 23, 0, 0, 0));
}

#[test]
fn empty_line_list_is_an_empty_set() {
    let lines: [&str; 0] = [];
    let set = parse_set_lines(&lines, Tz::UTC).unwrap();
    assert!(set.is_empty());
    assert!(parse_set_lines(&["", "  "], Tz::UTC).unwrap().is_empty());
}

#[test]
fn invalid_set_documents() {
    let cases = [
        "",
        "FREQ=DAILY;UNTIL=20180517T235959Z",
        "DTSTART:;",
        "RRULE:;",
        "RRULE:XXX",
        "RDATE;TZD=X:1",
        "RRULE:FREQ=DAILY\nDTSTART:20180101T090000Z",
        "RRULE:FREQ=DAILY;DTSTART=20180101T090000Z",
        "VEVENT:FOO",
        "RDATE:20180101T090000Z/20180102T090000Z",
    ];
    for case in cases {
        assert!(case.parse::<RuleSet>().is_err(), "{case:?} should be rejected");
    }
}
