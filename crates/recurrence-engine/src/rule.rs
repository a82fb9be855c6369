//! The immutable recurrence rule and its queries.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::dst::DstPolicy;
use crate::error::{RecurError, Result};
use crate::iter::{Plan, RuleIter};
use crate::options::Options;
use crate::query;

/// A validated recurrence rule.
///
/// A rule keeps the options exactly as supplied (for serialization) next to
/// a normalized copy (for expansion). It is never mutated after construction,
/// so it can be queried from several threads at once.
#[derive(Debug, Clone)]
pub struct Rule {
    original: Options,
    options: Options,
    plan: Plan,
}

impl Rule {
    /// Validate `options` and build a rule from them.
    ///
    /// # Errors
    /// Returns `RecurError::Validation` naming the first out-of-range field.
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;
        Ok(Rule::from_valid(options, DstPolicy::default()))
    }

    fn from_valid(original: Options, dst_policy: DstPolicy) -> Self {
        let (options, dtstart) = original.normalized();
        let plan = Plan::new(&options, dtstart, dst_policy);
        Rule {
            original,
            options,
            plan,
        }
    }

    /// Same rule, resolving DST-gap wall times with `policy`.
    /// The anchor is kept as resolved, including the current-time anchor of
    /// a rule built without DTSTART.
    pub fn with_dst_policy(mut self, policy: DstPolicy) -> Self {
        self.plan.dst_policy = policy;
        self
    }

    /// Same rule, anchored at `dtstart`. Other options are kept as supplied.
    pub fn with_dtstart(&self, dtstart: DateTime<Tz>) -> Self {
        let mut original = self.original.clone();
        original.dtstart = Some(dtstart);
        Rule::from_valid(original, self.plan.dst_policy)
    }

    /// Options as supplied by the caller.
    pub fn original_options(&self) -> &Options {
        &self.original
    }

    /// Options with RFC 5545 defaults applied.
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn dtstart(&self) -> DateTime<Tz> {
        self.plan.dtstart
    }

    pub fn timezone(&self) -> Tz {
        self.plan.tz
    }

    pub fn until(&self) -> Option<DateTime<Tz>> {
        self.plan.until
    }

    pub fn count(&self) -> Option<u32> {
        self.plan.count
    }

    pub fn dst_policy(&self) -> DstPolicy {
        self.plan.dst_policy
    }

    /// True when the rule ends on its own (COUNT or UNTIL is set).
    pub fn is_bounded(&self) -> bool {
        self.plan.count.is_some() || self.plan.until.is_some()
    }

    pub(crate) fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Lazy ascending stream of occurrences.
    pub fn iter(&self) -> RuleIter<'_> {
        RuleIter::new(self)
    }

    /// Stream that skips whole periods ending well before `start` when the
    /// rule has no COUNT. Occurrences before `start` may still come out.
    pub(crate) fn iter_from(&self, start: DateTime<Tz>) -> RuleIter<'_> {
        let mut iter = RuleIter::new(self);
        iter.seek(start);
        iter
    }

    /// Every occurrence of a bounded rule.
    ///
    /// # Errors
    /// Returns `RecurError::Unbounded` when neither COUNT nor UNTIL is set.
    pub fn all(&self) -> Result<Vec<DateTime<Tz>>> {
        if !self.is_bounded() {
            return Err(RecurError::Unbounded);
        }
        Ok(self.iter().collect())
    }

    /// At most `limit` occurrences from the start of the rule.
    pub fn all_with_limit(&self, limit: usize) -> Vec<DateTime<Tz>> {
        self.iter().take(limit).collect()
    }

    /// Occurrences between `start` and `end`; each bound is inclusive or
    /// exclusive on its own.
    pub fn between(
        &self,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        inclusive_start: bool,
        inclusive_end: bool,
    ) -> Vec<DateTime<Tz>> {
        query::between(self.iter_from(start), start, end, inclusive_start, inclusive_end)
    }

    /// First occurrence after `dt` (or at `dt` when `inclusive`).
    pub fn after(&self, dt: DateTime<Tz>, inclusive: bool) -> Option<DateTime<Tz>> {
        query::after(self.iter_from(dt), dt, inclusive)
    }

    /// Last occurrence before `dt` (or at `dt` when `inclusive`).
    pub fn before(&self, dt: DateTime<Tz>, inclusive: bool) -> Option<DateTime<Tz>> {
        query::before(self.iter(), dt, inclusive)
    }
}

impl<'a> IntoIterator for &'a Rule {
    type Item = DateTime<Tz>;
    type IntoIter = RuleIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
