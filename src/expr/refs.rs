//! Reference Parser
//!
//! Extracts the `$RefID` tokens embedded in expression text.
//!
//! # Supported Syntax
//!
//! ```text
//! $A            identifier: letters, digits, underscore
//! ${my query}   braced: anything except '}' and '$'
//! ```
//!
//! A `$` that is not followed by a well-formed token is a parse error:
//! `$` alone, `$ A`, `$$A`, `${}`, `${A$B}` and an unterminated `${A`.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    combinator::{map, verify},
    sequence::{delimited, preceded},
    IResult,
};
use std::collections::BTreeSet;

use crate::expr::error::{ExprError, ExprResult};

/// Parse every `$RefID` reference out of an expression
pub fn parse_references(text: &str) -> ExprResult<BTreeSet<String>> {
    let mut refs = BTreeSet::new();
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        let offset = text.len() - rest.len() + pos;
        let token_start = &rest[pos..];

        match reference(token_start) {
            Ok((remaining, id)) => {
                refs.insert(id);
                rest = remaining;
            }
            Err(_) => return Err(malformed(token_start, offset)),
        }
    }

    Ok(refs)
}

/// Parse an expression that must be exactly one reference
///
/// Accepts `$A`, `${A}` or a bare identifier `A`.
pub fn single_reference(text: &str) -> ExprResult<String> {
    let trimmed = text.trim();

    if !trimmed.contains('$') {
        if let Ok(("", id)) = identifier(trimmed) {
            return Ok(id.to_string());
        }
    }

    match reference(trimmed) {
        Ok(("", id)) => Ok(id),
        Ok(_) => Err(ExprError::Parse(format!(
            "Expected a single node reference, found '{}'",
            trimmed
        ))),
        Err(_) => match trimmed.find('$') {
            Some(pos) => Err(malformed(&trimmed[pos..], pos)),
            None => Err(ExprError::Parse(format!(
                "Expected a single node reference, found '{}'",
                trimmed
            ))),
        },
    }
}

/// Parse one `$name` or `${name}` token
pub(crate) fn reference(input: &str) -> IResult<&str, String> {
    preceded(
        char('$'),
        alt((
            map(
                delimited(
                    char('{'),
                    verify(take_while1(|c: char| c != '}' && c != '$'), |s: &str| {
                        !s.trim().is_empty()
                    }),
                    char('}'),
                ),
                |s: &str| s.trim().to_string(),
            ),
            map(identifier, str::to_string),
        )),
    )(input)
}

/// Parse a bare identifier
fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// Describe why the token at `offset` is not a valid reference
fn malformed(token: &str, offset: usize) -> ExprError {
    let after = &token[1..];

    let reason = match after.chars().next() {
        None => "empty reference identifier".to_string(),
        Some('$') => "nested '$' in reference".to_string(),
        Some('{') => {
            let body: Result<(&str, &str), nom::Err<nom::error::Error<&str>>> =
                take_while(|c: char| c != '}')(&after[1..]);
            match body {
                Ok((_, body)) if body.contains('$') => "nested '$' in reference".to_string(),
                Ok((rest, _)) if rest.is_empty() => "unterminated '${' reference".to_string(),
                _ => "empty reference identifier".to_string(),
            }
        }
        Some(_) => "empty reference identifier".to_string(),
    };

    ExprError::Parse(format!("Malformed reference at offset {}: {}", offset, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(text: &str) -> Vec<String> {
        parse_references(text).unwrap().into_iter().collect()
    }

    #[test]
    fn test_parse_simple_references() {
        assert_eq!(refs("$A + 1"), vec!["A"]);
        assert_eq!(refs("$A / $B"), vec!["A", "B"]);
        assert_eq!(refs("($cpu_1 - $mem) * 2"), vec!["cpu_1", "mem"]);
    }

    #[test]
    fn test_duplicates_collapse() {
        assert_eq!(refs("$A + $A * $A"), vec!["A"]);
    }

    #[test]
    fn test_case_sensitive() {
        assert_eq!(refs("$a + $A"), vec!["A", "a"]);
    }

    #[test]
    fn test_braced_references() {
        assert_eq!(refs("${my query} + ${B}"), vec!["B", "my query"]);
    }

    #[test]
    fn test_no_references() {
        assert!(refs("1 + 2").is_empty());
        assert!(refs("").is_empty());
    }

    #[test]
    fn test_malformed_references() {
        for bad in ["$", "$ A", "1 + $", "$$A", "${}", "${A$B}", "${A", "$+1"] {
            let err = parse_references(bad).unwrap_err();
            assert!(matches!(err, ExprError::Parse(_)), "{}: {:?}", bad, err);
        }

        let err = parse_references("$A + $$B").unwrap_err();
        assert!(err.to_string().contains("nested"), "{}", err);
        assert!(err.to_string().contains("offset 5"), "{}", err);

        let err = parse_references("${A").unwrap_err();
        assert!(err.to_string().contains("unterminated"), "{}", err);
    }

    #[test]
    fn test_single_reference() {
        assert_eq!(single_reference("$A").unwrap(), "A");
        assert_eq!(single_reference(" ${my query} ").unwrap(), "my query");
        assert_eq!(single_reference("B").unwrap(), "B");

        assert!(single_reference("$A + $B").is_err());
        assert!(single_reference("$A + 1").is_err());
        assert!(single_reference("").is_err());
        assert!(single_reference("$").is_err());
    }
}
