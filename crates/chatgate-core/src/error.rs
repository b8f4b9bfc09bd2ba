//! Error types for chatgate.

use crate::ids::IdError;

/// Result type for chatgate domain operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// Errors raised by the domain model.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// No plan with this id.
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    /// A grant duration outside the accepted range.
    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    /// A payment status string outside the processor vocabulary.
    #[error("unknown payment status: {0}")]
    UnknownStatus(String),

    /// A calendar date that could not be parsed.
    #[error("invalid date: {0}")]
    InvalidDate(String),
}

/// Longest premium grant accepted, in days.
pub const MAX_GRANT_DAYS: u32 = 36_500;

/// Check that a grant duration is between 1 and [`MAX_GRANT_DAYS`].
///
/// # Errors
///
/// Returns `GateError::InvalidDuration` if `days` is zero or above the limit.
pub fn check_days(days: u32) -> Result<u32> {
    match days {
        0 => Err(GateError::InvalidDuration(
            "0 is not a positive number of days".into(),
        )),
        days if days > MAX_GRANT_DAYS => Err(GateError::InvalidDuration(format!(
            "{days} days is more than the maximum of {MAX_GRANT_DAYS}"
        ))),
        days => Ok(days),
    }
}

/// Parse a positive day count, as given to admin grants.
///
/// # Errors
///
/// Returns `GateError::InvalidDuration` for non-numeric, zero, negative or oversized input.
pub fn parse_days(input: &str) -> Result<u32> {
    let days = input.trim().parse::<u32>().map_err(|_| {
        GateError::InvalidDuration(format!("{input:?} is not a positive number of days"))
    })?;
    check_days(days)
}

/// Parse a `YYYY-MM-DD` calendar date.
///
/// # Errors
///
/// Returns `GateError::InvalidDate` if the input is not a valid date.
pub fn parse_day(input: &str) -> Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| GateError::InvalidDate(input.to_string()))
}
