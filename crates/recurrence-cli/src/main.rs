//! `recur` CLI: expand, query, and normalize RFC 5545 recurrence rules.
//!
//! ## Usage
//!
//! ```sh
//! # Expand a bounded rule
//! recur expand --rule "DTSTART:19970902T090000Z
//! RRULE:FREQ=DAILY;COUNT=10"
//!
//! # Expand a set document from a file, as JSON
//! recur expand -i meeting.ics --json
//!
//! # Unbounded rules are capped (default 500)
//! echo "FREQ=WEEKLY;BYDAY=MO,WE" | recur expand --limit 20
//!
//! # Occurrences inside a window, in a zone
//! recur between --tz America/New_York --start 20240101T000000 --end 20240201T000000 --inclusive-start -i rule.txt
//!
//! # First occurrence after / last occurrence before an instant
//! recur after --at 20240301T000000Z -i rule.txt
//! recur before --at 20240301T000000Z --inclusive -i rule.txt
//!
//! # Canonical text form
//! recur normalize --rule "RRULE:BYDAY=MO;FREQ=WEEKLY;INTERVAL=1"
//! ```

use anyhow::{Context, Result};
use chrono::DateTime;
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};
use recurrence_engine::{parse_dtstart, parse_rule, parse_set, resolve_timezone, DstPolicy, RuleSet};
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "recur",
    version,
    about = "RFC 5545 recurrence rule CLI"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Default zone for local times without a TZID
    #[arg(long, global = true, default_value = "UTC")]
    tz: String,

    /// How wall-clock times inside a DST gap are resolved
    #[arg(long, global = true, value_enum, default_value_t = DstArg::WallClock)]
    dst: DstArg,

    /// Print JSON instead of one value per line
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List every occurrence (capped by --limit when the rule never ends)
    Expand {
        #[command(flatten)]
        source: Source,
        /// Maximum occurrences printed for an unbounded rule
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
    /// List the occurrences inside a window
    Between {
        #[command(flatten)]
        source: Source,
        /// Window start: `[TZID=zone:]YYYYMMDD[THHMMSS[Z]]`
        #[arg(long)]
        start: String,
        /// Window end, same format as --start
        #[arg(long)]
        end: String,
        /// Include an occurrence equal to --start
        #[arg(long)]
        inclusive_start: bool,
        /// Include an occurrence equal to --end
        #[arg(long)]
        inclusive_end: bool,
    },
    /// Print the first occurrence after an instant
    After {
        #[command(flatten)]
        source: Source,
        /// Reference instant: `[TZID=zone:]YYYYMMDD[THHMMSS[Z]]`
        #[arg(long)]
        at: String,
        /// Also accept an occurrence equal to --at
        #[arg(long)]
        inclusive: bool,
    },
    /// Print the last occurrence before an instant
    Before {
        #[command(flatten)]
        source: Source,
        /// Reference instant: `[TZID=zone:]YYYYMMDD[THHMMSS[Z]]`
        #[arg(long)]
        at: String,
        /// Also accept an occurrence equal to --at
        #[arg(long)]
        inclusive: bool,
    },
    /// Print the canonical text form of a rule or set
    Normalize {
        #[command(flatten)]
        source: Source,
    },
}

/// Where the rule text comes from. Stdin when neither flag is given.
#[derive(Args)]
struct Source {
    /// Rule or set text given inline
    #[arg(long, conflicts_with = "input")]
    rule: Option<String>,
    /// Input file
    #[arg(short, long)]
    input: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DstArg {
    WallClock,
    ShiftForward,
    Skip,
}

impl From<DstArg> for DstPolicy {
    fn from(arg: DstArg) -> Self {
        match arg {
            DstArg::WallClock => DstPolicy::WallClock,
            DstArg::ShiftForward => DstPolicy::ShiftForward,
            DstArg::Skip => DstPolicy::Skip,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let tz = resolve_timezone(&cli.tz).with_context(|| format!("Invalid --tz: {}", cli.tz))?;
    let policy = DstPolicy::from(cli.dst);

    match cli.command {
        Commands::Expand { source, limit } => {
            let set = load(&source, tz, policy)?;
            let dates = if set.is_bounded() {
                set.all().context("Failed to expand rule")?
            } else {
                let dates = set.all_with_limit(limit);
                if dates.len() == limit {
                    tracing::warn!(limit, "rule has no COUNT or UNTIL; output truncated");
                }
                dates
            };
            print_dates(&dates, cli.json)?;
        }
        Commands::Between {
            source,
            start,
            end,
            inclusive_start,
            inclusive_end,
        } => {
            let set = load(&source, tz, policy)?;
            let start = parse_instant(&start, tz, "--start")?;
            let end = parse_instant(&end, tz, "--end")?;
            let dates = set.between(start, end, inclusive_start, inclusive_end);
            print_dates(&dates, cli.json)?;
        }
        Commands::After {
            source,
            at,
            inclusive,
        } => {
            let set = load(&source, tz, policy)?;
            let at = parse_instant(&at, tz, "--at")?;
            print_single(set.after(at, inclusive), cli.json)?;
        }
        Commands::Before {
            source,
            at,
            inclusive,
        } => {
            let set = load(&source, tz, policy)?;
            let at = parse_instant(&at, tz, "--at")?;
            print_single(set.before(at, inclusive), cli.json)?;
        }
        Commands::Normalize { source } => {
            let set = load(&source, tz, policy)?;
            let text = set.to_string();
            if cli.json {
                println!("{}", serde_json::to_string(&text)?);
            } else {
                println!("{text}");
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays parseable.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Read the rule text and parse it. One non-blank line is a single rule,
/// anything longer is a set document.
fn load(source: &Source, tz: Tz, policy: DstPolicy) -> Result<RuleSet> {
    let text = read_input(source)?;
    let lines = text.lines().filter(|line| !line.trim().is_empty()).count();
    tracing::debug!(lines, %tz, "parsing input");

    let set = if lines <= 1 {
        let rule = parse_rule(&text, tz).context("Failed to parse rule")?;
        RuleSet::from(rule)
    } else {
        parse_set(&text, tz).context("Failed to parse rule set")?
    };
    Ok(with_policy(&set, policy))
}

/// Rebuild `set` with `policy` attached to every rule.
fn with_policy(set: &RuleSet, policy: DstPolicy) -> RuleSet {
    if policy == DstPolicy::default() {
        return set.clone();
    }
    let mut out = RuleSet::new();
    if let Some(dtstart) = set.dtstart() {
        out.set_dtstart(dtstart);
    }
    for rule in set.rrules() {
        out.add_rrule(rule.clone().with_dst_policy(policy));
    }
    for rule in set.exrules() {
        out.add_exrule(rule.clone().with_dst_policy(policy));
    }
    for dt in set.rdates() {
        out.add_rdate(*dt);
    }
    for dt in set.exdates() {
        out.add_exdate(*dt);
    }
    out
}

fn parse_instant(value: &str, tz: Tz, flag: &str) -> Result<DateTime<Tz>> {
    parse_dtstart(value, tz).with_context(|| format!("Invalid {flag}: {value}"))
}

fn print_dates(dates: &[DateTime<Tz>], json: bool) -> Result<()> {
    if json {
        let values: Vec<String> = dates.iter().map(DateTime::to_rfc3339).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        for dt in dates {
            println!("{}", dt.to_rfc3339());
        }
    }
    Ok(())
}

fn print_single(dt: Option<DateTime<Tz>>, json: bool) -> Result<()> {
    match (dt, json) {
        (Some(dt), true) => println!("{}", serde_json::to_string(&dt.to_rfc3339())?),
        (None, true) => println!("null"),
        (Some(dt), false) => println!("{}", dt.to_rfc3339()),
        (None, false) => {}
    }
    Ok(())
}

fn read_input(source: &Source) -> Result<String> {
    if let Some(rule) = &source.rule {
        return Ok(rule.clone());
    }
    match &source.input {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}
