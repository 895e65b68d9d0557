//! Math Expression Parser
//!
//! Recursive-descent parser for math node expressions, one function per
//! precedence level.
//!
//! # Examples
//!
//! ```text
//! $A + 1
//! $A / $B
//! ($A - $B) * 100 / $B
//! -$A % 60
//! $A > 5 && $B < 2
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, digit1, multispace0, one_of},
    combinator::{map, map_res, opt, recognize, value},
    error::ErrorKind,
    sequence::{delimited, pair, tuple},
    IResult,
};

use crate::expr::ast::{BinaryOp, MathExpr};
use crate::expr::error::{ExprError, ExprResult};
use crate::expr::refs::reference;

/// Deepest parenthesis / unary sign nesting accepted
const MAX_NESTING: usize = 128;

/// Deepest syntax tree accepted; long operator chains count one level per operator
const MAX_DEPTH: usize = 1024;

/// An expression and the depth of its tree
type Parsed = (MathExpr, usize);

/// Parse a math expression string into a `MathExpr`
pub fn parse_math(input: &str) -> ExprResult<MathExpr> {
    if input.trim().is_empty() {
        return Err(ExprError::Parse("Empty expression".to_string()));
    }

    match expression(input, 0) {
        Ok((remaining, (expr, _))) => {
            if remaining.trim().is_empty() {
                Ok(expr)
            } else {
                Err(ExprError::Parse(format!(
                    "Unexpected input at offset {}: '{}'",
                    input.len() - remaining.len(),
                    remaining.trim()
                )))
            }
        }
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => Err(ExprError::Parse(format!(
            "expression nested too deeply at offset {}",
            input.len() - e.input.len()
        ))),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ExprError::Parse(format!(
            "Invalid expression at offset {}: '{}'",
            input.len() - e.input.len(),
            e.input.trim()
        ))),
        Err(nom::Err::Incomplete(_)) => Err(ExprError::Parse("Incomplete expression".to_string())),
    }
}

/// Top level: logical OR
fn expression(input: &str, nesting: usize) -> IResult<&str, Parsed> {
    logical_or(input, nesting)
}

fn logical_or(input: &str, nesting: usize) -> IResult<&str, Parsed> {
    chain(input, nesting, logical_and, ws(value(BinaryOp::Or, tag("||"))))
}

fn logical_and(input: &str, nesting: usize) -> IResult<&str, Parsed> {
    chain(input, nesting, comparison, ws(value(BinaryOp::And, tag("&&"))))
}

fn comparison(input: &str, nesting: usize) -> IResult<&str, Parsed> {
    chain(input, nesting, additive, ws(comparison_operator))
}

fn additive(input: &str, nesting: usize) -> IResult<&str, Parsed> {
    chain(
        input,
        nesting,
        multiplicative,
        ws(alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        ))),
    )
}

fn multiplicative(input: &str, nesting: usize) -> IResult<&str, Parsed> {
    chain(
        input,
        nesting,
        unary,
        ws(alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
            value(BinaryOp::Mod, char('%')),
        ))),
    )
}

/// Left-associative `operand (operator operand)*`
///
/// An operator not followed by an operand is left unconsumed.
fn chain<'a, O>(
    input: &'a str,
    nesting: usize,
    operand: fn(&'a str, usize) -> IResult<&'a str, Parsed>,
    mut operator: O,
) -> IResult<&'a str, Parsed>
where
    O: FnMut(&'a str) -> IResult<&'a str, BinaryOp>,
{
    let (mut input, (mut acc, mut depth)) = operand(input, nesting)?;

    loop {
        let (rest, op) = match operator(input) {
            Ok(parsed) => parsed,
            Err(nom::Err::Error(_)) => return Ok((input, (acc, depth))),
            Err(e) => return Err(e),
        };
        let (rest, (rhs, rhs_depth)) = match operand(rest, nesting) {
            Ok(parsed) => parsed,
            Err(nom::Err::Error(_)) => return Ok((input, (acc, depth))),
            Err(e) => return Err(e),
        };

        depth = depth.max(rhs_depth) + 1;
        if depth > MAX_DEPTH {
            return Err(too_deep(rest));
        }
        acc = MathExpr::binary(op, acc, rhs);
        input = rest;
    }
}

fn unary(input: &str, nesting: usize) -> IResult<&str, Parsed> {
    if nesting > MAX_NESTING {
        return Err(too_deep(input));
    }
    if let Ok((rest, _)) = ws(char('-'))(input) {
        let (rest, (inner, depth)) = unary(rest, nesting + 1)?;
        if depth >= MAX_DEPTH {
            return Err(too_deep(rest));
        }
        return Ok((rest, (MathExpr::neg(inner), depth + 1)));
    }
    if let Ok((rest, _)) = ws(char('+'))(input) {
        return unary(rest, nesting + 1);
    }
    primary(input, nesting)
}

fn primary(input: &str, nesting: usize) -> IResult<&str, Parsed> {
    ws(alt((
        map(number, |n| (MathExpr::Number(n), 1)),
        map(reference, |id| (MathExpr::Ref(id), 1)),
        delimited(char('('), |i| expression(i, nesting + 1), ws(char(')'))),
    )))(input)
}

fn too_deep(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, ErrorKind::TooLarge))
}

/// Parse comparison operator
fn comparison_operator(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Gte, tag(">=")),
        value(BinaryOp::Lte, tag("<=")),
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Gt, tag(">")),
        value(BinaryOp::Lt, tag("<")),
    ))(input)
}

/// Parse an unsigned decimal literal like `3`, `2.5`, `.5` or `1e-3`
fn number(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.parse::<f64>(),
    )(input)
}

/// Surround a parser with optional whitespace
fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(id: &str) -> MathExpr {
        MathExpr::Ref(id.to_string())
    }

    fn n(v: f64) -> MathExpr {
        MathExpr::Number(v)
    }

    #[test]
    fn test_parse_simple_addition() {
        let expr = parse_math("$A + 1").unwrap();
        assert_eq!(expr, MathExpr::binary(BinaryOp::Add, r("A"), n(1.0)));
    }

    #[test]
    fn test_precedence() {
        let expr = parse_math("$A + $B * 2").unwrap();
        assert_eq!(
            expr,
            MathExpr::binary(
                BinaryOp::Add,
                r("A"),
                MathExpr::binary(BinaryOp::Mul, r("B"), n(2.0))
            )
        );
    }

    #[test]
    fn test_left_associative() {
        let expr = parse_math("10 - 4 - 3").unwrap();
        assert_eq!(
            expr,
            MathExpr::binary(
                BinaryOp::Sub,
                MathExpr::binary(BinaryOp::Sub, n(10.0), n(4.0)),
                n(3.0)
            )
        );
    }

    #[test]
    fn test_parentheses() {
        let expr = parse_math("($A + $B) * 2").unwrap();
        assert_eq!(
            expr,
            MathExpr::binary(
                BinaryOp::Mul,
                MathExpr::binary(BinaryOp::Add, r("A"), r("B")),
                n(2.0)
            )
        );
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(parse_math("-$A").unwrap(), MathExpr::neg(r("A")));
        assert_eq!(
            parse_math("2 * -3").unwrap(),
            MathExpr::binary(BinaryOp::Mul, n(2.0), MathExpr::neg(n(3.0)))
        );
        assert_eq!(
            parse_math("--1").unwrap(),
            MathExpr::neg(MathExpr::neg(n(1.0)))
        );
    }

    #[test]
    fn test_no_whitespace() {
        assert_eq!(
            parse_math("$A-1").unwrap(),
            MathExpr::binary(BinaryOp::Sub, r("A"), n(1.0))
        );
        assert_eq!(
            parse_math("$A/$B").unwrap(),
            MathExpr::binary(BinaryOp::Div, r("A"), r("B"))
        );
    }

    #[test]
    fn test_number_formats() {
        assert_eq!(parse_math("2.5").unwrap(), n(2.5));
        assert_eq!(parse_math(".5").unwrap(), n(0.5));
        assert_eq!(parse_math("1e3").unwrap(), n(1000.0));
        assert_eq!(parse_math("1.5E-2").unwrap(), n(0.015));
    }

    #[test]
    fn test_comparison_and_logic() {
        let expr = parse_math("$A > 5 && $B <= 2 || $C == 1").unwrap();
        assert_eq!(
            expr,
            MathExpr::binary(
                BinaryOp::Or,
                MathExpr::binary(
                    BinaryOp::And,
                    MathExpr::binary(BinaryOp::Gt, r("A"), n(5.0)),
                    MathExpr::binary(BinaryOp::Lte, r("B"), n(2.0)),
                ),
                MathExpr::binary(BinaryOp::Eq, r("C"), n(1.0)),
            )
        );
    }

    #[test]
    fn test_braced_reference() {
        assert_eq!(
            parse_math("${my query} * 2").unwrap(),
            MathExpr::binary(BinaryOp::Mul, r("my query"), n(2.0))
        );
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "   ", "$A +", "($A + 1", "$A + 1)", "1 2", "abs($A)", "$", "$A ** 2"] {
            let result = parse_math(bad);
            assert!(matches!(result, Err(ExprError::Parse(_))), "{}: {:?}", bad, result);
        }
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = parse_math(&parens).unwrap_err();
        assert!(matches!(&err, ExprError::Parse(msg) if msg.contains("nested too deeply")), "{:?}", err);

        let signs = format!("{}$A", "-".repeat(10_000));
        assert!(matches!(parse_math(&signs), Err(ExprError::Parse(_))));

        let chain = vec!["$A"; 5_000].join(" + ");
        assert!(matches!(parse_math(&chain), Err(ExprError::Parse(_))));
    }

    #[test]
    fn test_moderate_nesting_accepted() {
        let depth = MAX_NESTING - 8;
        let parens = format!("{}$A{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(parse_math(&parens).unwrap(), r("A"));

        let chain = vec!["1"; 500].join(" + ");
        assert!(parse_math(&chain).is_ok());
    }

    #[test]
    fn test_references_match_reference_parser() {
        let text = "($A - $B) / ${C D} + $A";
        let expr = parse_math(text).unwrap();
        assert_eq!(
            expr.references(),
            crate::expr::refs::parse_references(text).unwrap()
        );
    }
}
