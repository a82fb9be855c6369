//! Query operations shared by [`Rule`](crate::Rule) and
//! [`RuleSet`](crate::RuleSet).
//!
//! Each query consumes an ascending occurrence stream and stops pulling as
//! soon as the answer is known, so unbounded rules are safe to query.

use chrono::DateTime;
use chrono_tz::Tz;

pub(crate) fn between<I>(
    occurrences: I,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    inclusive_start: bool,
    inclusive_end: bool,
) -> Vec<DateTime<Tz>>
where
    I: Iterator<Item = DateTime<Tz>>,
{
    occurrences
        .skip_while(|dt| if inclusive_start { *dt < start } else { *dt <= start })
        .take_while(|dt| if inclusive_end { *dt <= end } else { *dt < end })
        .collect()
}

pub(crate) fn after<I>(mut occurrences: I, dt: DateTime<Tz>, inclusive: bool) -> Option<DateTime<Tz>>
where
    I: Iterator<Item = DateTime<Tz>>,
{
    occurrences.find(|candidate| if inclusive { *candidate >= dt } else { *candidate > dt })
}

pub(crate) fn before<I>(occurrences: I, dt: DateTime<Tz>, inclusive: bool) -> Option<DateTime<Tz>>
where
    I: Iterator<Item = DateTime<Tz>>,
{
    occurrences
        .take_while(|candidate| if inclusive { *candidate <= dt } else { *candidate < dt })
        .last()
}
