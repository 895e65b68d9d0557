//! Duration strings for resample windows
//!
//! ```text
//! 30s  1m  5m  1h  1h30m  1d  1w  500ms  1y
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::digit1,
    combinator::{map_res, value},
    multi::many1,
    sequence::pair,
    IResult,
};

use crate::expr::error::{ExprError, ExprResult};

const SECOND_MS: i64 = 1000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Parse a duration string into milliseconds
///
/// Components may be chained (`1h30m`). The total must be positive.
pub fn parse_duration(input: &str) -> ExprResult<i64> {
    let trimmed = input.trim();
    let invalid = || ExprError::InvalidDuration(format!("'{}'", input));

    let parts = match many1(duration_part)(trimmed) {
        Ok(("", parts)) => parts,
        _ => return Err(invalid()),
    };

    let total = parts
        .into_iter()
        .try_fold(0i64, |acc, (n, unit)| n.checked_mul(unit).and_then(|v| acc.checked_add(v)))
        .ok_or_else(|| ExprError::InvalidDuration(format!("'{}' overflows", input)))?;

    if total <= 0 {
        return Err(ExprError::InvalidDuration(format!(
            "'{}' must be greater than zero",
            input
        )));
    }

    Ok(total)
}

/// Parse one component like "7d", "24h", "30m"
fn duration_part(input: &str) -> IResult<&str, (i64, i64)> {
    pair(
        map_res(digit1, |s: &str| s.parse::<i64>()),
        alt((
            value(1i64, tag("ms")),
            value(SECOND_MS, tag("s")),
            value(MINUTE_MS, tag("m")),
            value(HOUR_MS, tag("h")),
            value(DAY_MS, tag("d")),
            value(7 * DAY_MS, tag("w")),
            value(365 * DAY_MS, tag("y")),
        )),
    )(input)
}
