//! Math Expression Syntax Tree
//!
//! Arithmetic over numeric literals and `$RefID` operands.
//!
//! # Precedence (lowest first)
//!
//! ```text
//! ||
//! &&
//! == != > >= < <=
//! + -
//! * / %
//! unary -
//! ```

use std::collections::BTreeSet;

/// A parsed math expression
#[derive(Debug, Clone, PartialEq)]
pub enum MathExpr {
    /// Numeric literal
    Number(f64),
    /// Reference to another node's frame
    Ref(String),
    /// Unary negation
    Neg(Box<MathExpr>),
    /// Binary operation
    Binary {
        op: BinaryOp,
        left: Box<MathExpr>,
        right: Box<MathExpr>,
    },
}

impl MathExpr {
    /// Build a binary node
    pub fn binary(op: BinaryOp, left: MathExpr, right: MathExpr) -> Self {
        MathExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Build a negation node
    pub fn neg(inner: MathExpr) -> Self {
        MathExpr::Neg(Box::new(inner))
    }

    /// All RefIDs used as operands
    pub fn references(&self) -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs(&self, refs: &mut BTreeSet<String>) {
        match self {
            MathExpr::Number(_) => {}
            MathExpr::Ref(id) => {
                refs.insert(id.clone());
            }
            MathExpr::Neg(inner) => inner.collect_refs(refs),
            MathExpr::Binary { left, right, .. } => {
                left.collect_refs(refs);
                right.collect_refs(refs);
            }
        }
    }
}

impl std::fmt::Display for MathExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MathExpr::Number(n) => write!(f, "{}", n),
            MathExpr::Ref(id) if id.chars().all(|c| c.is_alphanumeric() || c == '_') => {
                write!(f, "${}", id)
            }
            MathExpr::Ref(id) => write!(f, "${{{}}}", id),
            MathExpr::Neg(inner) => write!(f, "-({})", inner),
            MathExpr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// Apply the operator to two values
    ///
    /// Arithmetic follows IEEE-754: division by zero gives a signed infinity
    /// or NaN, never an error. Comparisons and logic yield 1 or 0, and NaN if
    /// either side is NaN.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Mod => a % b,
            _ if a.is_nan() || b.is_nan() => f64::NAN,
            Self::Gt => bool_value(a > b),
            Self::Gte => bool_value(a >= b),
            Self::Lt => bool_value(a < b),
            Self::Lte => bool_value(a <= b),
            Self::Eq => bool_value(a == b),
            Self::Ne => bool_value(a != b),
            Self::And => bool_value(a != 0.0 && b != 0.0),
            Self::Or => bool_value(a != 0.0 || b != 0.0),
        }
    }

    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_by_zero_is_ieee() {
        assert_eq!(BinaryOp::Div.apply(5.0, 0.0), f64::INFINITY);
        assert_eq!(BinaryOp::Div.apply(-5.0, 0.0), f64::NEG_INFINITY);
        assert!(BinaryOp::Div.apply(0.0, 0.0).is_nan());
        assert!(BinaryOp::Mod.apply(1.0, 0.0).is_nan());
    }

    #[test]
    fn test_nan_is_sticky() {
        for op in [BinaryOp::Add, BinaryOp::Mul, BinaryOp::Gt, BinaryOp::Eq, BinaryOp::And] {
            assert!(op.apply(f64::NAN, 1.0).is_nan(), "{}", op);
            assert!(op.apply(1.0, f64::NAN).is_nan(), "{}", op);
        }
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(BinaryOp::Gt.apply(2.0, 1.0), 1.0);
        assert_eq!(BinaryOp::Lte.apply(2.0, 1.0), 0.0);
        assert_eq!(BinaryOp::And.apply(1.0, 0.0), 0.0);
        assert_eq!(BinaryOp::Or.apply(1.0, 0.0), 1.0);
    }

    #[test]
    fn test_references() {
        let expr = MathExpr::binary(
            BinaryOp::Add,
            MathExpr::Ref("B".into()),
            MathExpr::neg(MathExpr::Ref("A".into())),
        );
        let refs: Vec<_> = expr.references().into_iter().collect();
        assert_eq!(refs, vec!["A", "B"]);
    }

    #[test]
    fn test_display() {
        let expr = MathExpr::binary(
            BinaryOp::Mul,
            MathExpr::Ref("my query".into()),
            MathExpr::Number(2.0),
        );
        assert_eq!(expr.to_string(), "(${my query} * 2)");
    }
}
