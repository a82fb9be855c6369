//! Error types for recurrence-engine operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecurError {
    /// An option value is out of range or inconsistent. `field` is the RFC 5545
    /// property name (e.g. `BYMONTH`).
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Textual input does not match the grammar. `line` is 1-based.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// `all()` was requested on a rule without COUNT or UNTIL.
    #[error("Rule is unbounded: set COUNT or UNTIL, or use a capped query")]
    Unbounded,
}

impl RecurError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        RecurError::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        RecurError::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RecurError>;
