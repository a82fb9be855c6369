//! Rule sets: several inclusion rules and literal dates, minus exclusion
//! rules and literal dates, merged into one ascending stream.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::iter::Peekable;

use chrono::{DateTime, SubsecRound};
use chrono_tz::Tz;

use crate::error::{RecurError, Result};
use crate::query;
use crate::rule::Rule;

/// An RRULE/RDATE/EXRULE/EXDATE collection.
///
/// Built with the `add_*` methods; insertion order is kept for serialization
/// and has no effect on the occurrence stream. Mutating a set while another
/// thread queries it needs external locking.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    dtstart: Option<DateTime<Tz>>,
    rrules: Vec<Rule>,
    rdates: Vec<DateTime<Tz>>,
    exrules: Vec<Rule>,
    exdates: Vec<DateTime<Tz>>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet::default()
    }

    /// Add an inclusion rule. A rule without its own DTSTART is anchored at
    /// the set's; a set without a DTSTART takes the rule's.
    pub fn add_rrule(&mut self, rule: Rule) -> &mut Self {
        let rule = self.adopt(rule);
        self.rrules.push(rule);
        self
    }

    /// Add an exclusion rule, anchored the same way as [`RuleSet::add_rrule`].
    pub fn add_exrule(&mut self, rule: Rule) -> &mut Self {
        let rule = self.adopt(rule);
        self.exrules.push(rule);
        self
    }

    pub fn add_rdate(&mut self, dt: DateTime<Tz>) -> &mut Self {
        self.rdates.push(dt.trunc_subsecs(0));
        self
    }

    pub fn add_exdate(&mut self, dt: DateTime<Tz>) -> &mut Self {
        self.exdates.push(dt.trunc_subsecs(0));
        self
    }

    /// Override the set's start, re-anchoring every rule already added.
    pub fn set_dtstart(&mut self, dtstart: DateTime<Tz>) -> &mut Self {
        let dtstart = dtstart.trunc_subsecs(0);
        self.dtstart = Some(dtstart);
        for rule in self.rrules.iter_mut().chain(self.exrules.iter_mut()) {
            *rule = rule.with_dtstart(dtstart);
        }
        self
    }

    /// The first DTSTART the set sees also anchors rules added before it
    /// without one, so the order of `add_*` calls does not matter.
    fn adopt(&mut self, rule: Rule) -> Rule {
        match (self.dtstart, rule.original_options().dtstart) {
            (Some(dtstart), None) => rule.with_dtstart(dtstart),
            (None, Some(own)) => {
                let dtstart = own.trunc_subsecs(0);
                self.dtstart = Some(dtstart);
                for earlier in self.rrules.iter_mut().chain(self.exrules.iter_mut()) {
                    if earlier.original_options().dtstart.is_none() {
                        *earlier = earlier.with_dtstart(dtstart);
                    }
                }
                rule
            }
            _ => rule,
        }
    }

    pub fn dtstart(&self) -> Option<DateTime<Tz>> {
        self.dtstart
    }

    /// The first inclusion rule added, if any. Every inclusion rule
    /// contributes occurrences; see [`RuleSet::rrules`].
    pub fn rrule(&self) -> Option<&Rule> {
        self.rrules.first()
    }

    pub fn rrules(&self) -> &[Rule] {
        &self.rrules
    }

    pub fn exrules(&self) -> &[Rule] {
        &self.exrules
    }

    pub fn rdates(&self) -> &[DateTime<Tz>] {
        &self.rdates
    }

    pub fn exdates(&self) -> &[DateTime<Tz>] {
        &self.exdates
    }

    /// True when the set holds nothing at all.
    pub fn is_empty(&self) -> bool {
        self.rrules.is_empty()
            && self.rdates.is_empty()
            && self.exrules.is_empty()
            && self.exdates.is_empty()
    }

    /// True when every inclusion rule ends on its own.
    pub fn is_bounded(&self) -> bool {
        self.rrules.iter().all(Rule::is_bounded)
    }

    pub fn iter(&self) -> SetIter<'_> {
        self.iter_seeking(None)
    }

    fn iter_seeking(&self, start: Option<DateTime<Tz>>) -> SetIter<'_> {
        SetIter {
            include: Merge::new(&self.rrules, &self.rdates, start),
            exclude: Merge::new(&self.exrules, &self.exdates, start).peekable(),
            last: None,
        }
    }

    /// Every occurrence of the set.
    ///
    /// # Errors
    /// Returns `RecurError::Unbounded` when an inclusion rule has neither
    /// COUNT nor UNTIL.
    pub fn all(&self) -> Result<Vec<DateTime<Tz>>> {
        if !self.is_bounded() {
            return Err(RecurError::Unbounded);
        }
        Ok(self.iter().collect())
    }

    pub fn all_with_limit(&self, limit: usize) -> Vec<DateTime<Tz>> {
        self.iter().take(limit).collect()
    }

    pub fn between(
        &self,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        inclusive_start: bool,
        inclusive_end: bool,
    ) -> Vec<DateTime<Tz>> {
        query::between(self.iter_seeking(Some(start)), start, end, inclusive_start, inclusive_end)
    }

    pub fn after(&self, dt: DateTime<Tz>, inclusive: bool) -> Option<DateTime<Tz>> {
        query::after(self.iter_seeking(Some(dt)), dt, inclusive)
    }

    pub fn before(&self, dt: DateTime<Tz>, inclusive: bool) -> Option<DateTime<Tz>> {
        query::before(self.iter(), dt, inclusive)
    }
}

impl From<Rule> for RuleSet {
    fn from(rule: Rule) -> Self {
        let mut set = RuleSet::new();
        set.add_rrule(rule);
        set
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = DateTime<Tz>;
    type IntoIter = SetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

type Source<'a> = Box<dyn Iterator<Item = DateTime<Tz>> + 'a>;

/// K-way ascending merge over rule streams and a sorted list of literal
/// dates. Duplicates are passed through.
struct Merge<'a> {
    sources: Vec<Source<'a>>,
    heap: BinaryHeap<Reverse<(DateTime<Tz>, usize)>>,
}

impl<'a> Merge<'a> {
    /// With `start`, rule streams skip periods well before it.
    fn new(rules: &'a [Rule], dates: &[DateTime<Tz>], start: Option<DateTime<Tz>>) -> Self {
        let mut sorted = dates.to_vec();
        sorted.sort_unstable();

        let mut sources: Vec<Source<'a>> = rules
            .iter()
            .map(|rule| match start {
                Some(start) => Box::new(rule.iter_from(start)) as Source<'a>,
                None => Box::new(rule.iter()) as Source<'a>,
            })
            .collect();
        sources.push(Box::new(sorted.into_iter()));

        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (index, source) in sources.iter_mut().enumerate() {
            if let Some(dt) = source.next() {
                heap.push(Reverse((dt, index)));
            }
        }
        Merge { sources, heap }
    }
}

impl Iterator for Merge<'_> {
    type Item = DateTime<Tz>;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse((dt, index)) = self.heap.pop()?;
        if let Some(next) = self.sources[index].next() {
            self.heap.push(Reverse((next, index)));
        }
        Some(dt)
    }
}

/// Lazy iterator over the occurrences of a [`RuleSet`], in ascending order.
pub struct SetIter<'a> {
    include: Merge<'a>,
    exclude: Peekable<Merge<'a>>,
    last: Option<DateTime<Tz>>,
}

impl Iterator for SetIter<'_> {
    type Item = DateTime<Tz>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dt = self.include.next()?;
            if self.last.is_some_and(|last| dt <= last) {
                continue;
            }
            self.last = Some(dt);
            while self.exclude.next_if(|excluded| *excluded < dt).is_some() {}
            if self.exclude.peek() == Some(&dt) {
                continue;
            }
            return Some(dt);
        }
    }
}
