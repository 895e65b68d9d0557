//! Threshold and classic conditions
//!
//! Both node kinds carry an ordered list of conditions combined left to
//! right. The wire shapes (`*Json`) are validated into typed conditions when
//! a node is built.
//!
//! ```text
//! threshold: {"evaluator": {"type": "gt", "params": [5]}, "operator": {"type": "and"}}
//! classic:   {"evaluator": {"type": "gt", "params": [5]},
//!             "operator":  {"type": "or"},
//!             "query":     {"params": ["A"]},
//!             "reducer":   {"type": "avg"}}
//! ```

use crate::reducer::ReducerId;
use serde::{Deserialize, Serialize};

/// Boolean operator joining a condition to the running result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    #[default]
    And,
    Or,
}

impl Combine {
    /// Combine the running result with the next condition
    pub fn apply(self, acc: bool, next: bool) -> bool {
        match self {
            Combine::And => acc && next,
            Combine::Or => acc || next,
        }
    }

    fn parse(name: &str) -> Result<Self, String> {
        match name {
            "and" => Ok(Combine::And),
            "or" => Ok(Combine::Or),
            other => Err(format!("unknown condition operator '{}'", other)),
        }
    }
}

/// Combine condition results left to right
///
/// The first condition's operator is ignored. Every later condition joins
/// the running result with its own operator.
pub fn combine_conditions<I>(results: I) -> Option<bool>
where
    I: IntoIterator<Item = (Combine, bool)>,
{
    let mut iter = results.into_iter();
    let (_, first) = iter.next()?;
    Some(iter.fold(first, |acc, (op, value)| op.apply(acc, value)))
}

/// Pointwise comparison used by threshold nodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdPredicate {
    Gt(f64),
    Lt(f64),
    /// Exclusive bounds
    WithinRange(f64, f64),
    /// Exclusive bounds
    OutsideRange(f64, f64),
    WithinRangeIncluded(f64, f64),
    OutsideRangeIncluded(f64, f64),
}

impl ThresholdPredicate {
    /// Test a value; NaN never matches
    pub fn matches(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        match *self {
            Self::Gt(t) => value > t,
            Self::Lt(t) => value < t,
            Self::WithinRange(lo, hi) => value > lo && value < hi,
            Self::OutsideRange(lo, hi) => value < lo || value > hi,
            Self::WithinRangeIncluded(lo, hi) => value >= lo && value <= hi,
            Self::OutsideRangeIncluded(lo, hi) => value <= lo || value >= hi,
        }
    }

    /// Wire name of the evaluator
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gt(_) => "gt",
            Self::Lt(_) => "lt",
            Self::WithinRange(..) => "within_range",
            Self::OutsideRange(..) => "outside_range",
            Self::WithinRangeIncluded(..) => "within_range_included",
            Self::OutsideRangeIncluded(..) => "outside_range_included",
        }
    }

    fn parse(evaluator: &EvaluatorJson) -> Result<Self, String> {
        let p = &evaluator.params;
        match evaluator.kind.as_str() {
            "gt" => Ok(Self::Gt(param(p, 0, "gt")?)),
            "lt" => Ok(Self::Lt(param(p, 0, "lt")?)),
            "within_range" => range(p, "within_range").map(|(lo, hi)| Self::WithinRange(lo, hi)),
            "outside_range" => range(p, "outside_range").map(|(lo, hi)| Self::OutsideRange(lo, hi)),
            "within_range_included" => range(p, "within_range_included")
                .map(|(lo, hi)| Self::WithinRangeIncluded(lo, hi)),
            "outside_range_included" => range(p, "outside_range_included")
                .map(|(lo, hi)| Self::OutsideRangeIncluded(lo, hi)),
            other => Err(format!("unknown threshold evaluator '{}'", other)),
        }
    }
}

/// Comparison applied to a reduced series value by classic nodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassicPredicate {
    Gt(f64),
    Lt(f64),
    WithinRange(f64, f64),
    OutsideRange(f64, f64),
    /// Passes when the series reduced to no value
    NoValue,
}

impl ClassicPredicate {
    /// Test a reduced value
    pub fn matches(&self, value: f64) -> bool {
        match *self {
            Self::NoValue => value.is_nan(),
            _ if value.is_nan() => false,
            Self::Gt(t) => value > t,
            Self::Lt(t) => value < t,
            Self::WithinRange(lo, hi) => value > lo && value < hi,
            Self::OutsideRange(lo, hi) => value < lo || value > hi,
        }
    }

    fn parse(evaluator: &EvaluatorJson) -> Result<Self, String> {
        let p = &evaluator.params;
        match evaluator.kind.as_str() {
            "gt" => Ok(Self::Gt(param(p, 0, "gt")?)),
            "lt" => Ok(Self::Lt(param(p, 0, "lt")?)),
            "within_range" => range(p, "within_range").map(|(lo, hi)| Self::WithinRange(lo, hi)),
            "outside_range" => range(p, "outside_range").map(|(lo, hi)| Self::OutsideRange(lo, hi)),
            "no_value" => Ok(Self::NoValue),
            other => Err(format!("unknown classic evaluator '{}'", other)),
        }
    }
}

fn param(params: &[f64], index: usize, kind: &str) -> Result<f64, String> {
    params
        .get(index)
        .copied()
        .ok_or_else(|| format!("evaluator '{}' needs {} parameter(s)", kind, index + 1))
}

/// Range bounds in ascending order, whichever way they were sent
fn range(params: &[f64], kind: &str) -> Result<(f64, f64), String> {
    let a = param(params, 0, kind)?;
    let b = param(params, 1, kind)?;
    Ok((a.min(b), a.max(b)))
}

/// One threshold condition
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdCondition {
    pub predicate: ThresholdPredicate,
    pub combine: Combine,
}

impl ThresholdCondition {
    pub fn new(predicate: ThresholdPredicate) -> Self {
        Self {
            predicate,
            combine: Combine::And,
        }
    }

    /// Builder method: set the joining operator
    pub fn with_combine(mut self, combine: Combine) -> Self {
        self.combine = combine;
        self
    }
}

/// One classic condition: reduce every series of `ref_id`, then compare
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicCondition {
    pub ref_id: String,
    pub reducer: ReducerId,
    pub predicate: ClassicPredicate,
    pub combine: Combine,
}

impl ClassicCondition {
    pub fn new(ref_id: impl Into<String>, reducer: impl Into<ReducerId>, predicate: ClassicPredicate) -> Self {
        Self {
            ref_id: ref_id.into(),
            reducer: reducer.into(),
            predicate,
            combine: Combine::And,
        }
    }

    /// Builder method: set the joining operator
    pub fn with_combine(mut self, combine: Combine) -> Self {
        self.combine = combine;
        self
    }
}

/// `{"type": "gt", "params": [5]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorJson {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Vec<f64>,
}

/// `{"type": "and"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorJson {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Threshold condition as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConditionJson {
    pub evaluator: EvaluatorJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<OperatorJson>,
}

/// `{"params": ["A"]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionQueryJson {
    pub params: Vec<String>,
}

/// `{"type": "avg"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionReducerJson {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Classic condition as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicConditionJson {
    pub evaluator: EvaluatorJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<OperatorJson>,
    pub query: ConditionQueryJson,
    pub reducer: ConditionReducerJson,
}

fn combine_of(operator: &Option<OperatorJson>) -> Result<Combine, String> {
    match operator {
        Some(op) => Combine::parse(&op.kind),
        None => Ok(Combine::And),
    }
}

impl TryFrom<&ThresholdConditionJson> for ThresholdCondition {
    type Error = String;

    fn try_from(json: &ThresholdConditionJson) -> Result<Self, Self::Error> {
        Ok(Self {
            predicate: ThresholdPredicate::parse(&json.evaluator)?,
            combine: combine_of(&json.operator)?,
        })
    }
}

impl TryFrom<&ClassicConditionJson> for ClassicCondition {
    type Error = String;

    fn try_from(json: &ClassicConditionJson) -> Result<Self, Self::Error> {
        let ref_id = match json.query.params.as_slice() {
            [id, ..] if !id.trim().is_empty() => id.trim().to_string(),
            _ => return Err("condition query must name a node in params[0]".to_string()),
        };

        if json.reducer.kind.trim().is_empty() {
            return Err("condition reducer type is empty".to_string());
        }

        Ok(Self {
            ref_id,
            reducer: ReducerId::new(json.reducer.kind.trim()),
            predicate: ClassicPredicate::parse(&json.evaluator)?,
            combine: combine_of(&json.operator)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_left_to_right() {
        use Combine::*;

        // First operator ignored
        assert_eq!(combine_conditions([(Or, false)]), Some(false));
        assert_eq!(combine_conditions([(And, true), (Or, true)]), Some(true));
        assert_eq!(combine_conditions([(And, true), (And, false)]), Some(false));

        // (true || false) && false, not true || (false && false)
        assert_eq!(
            combine_conditions([(And, true), (Or, false), (And, false)]),
            Some(false)
        );
        assert_eq!(combine_conditions(Vec::<(Combine, bool)>::new()), None);
    }

    #[test]
    fn test_threshold_predicates() {
        assert!(ThresholdPredicate::Gt(5.0).matches(6.0));
        assert!(!ThresholdPredicate::Gt(5.0).matches(5.0));
        assert!(ThresholdPredicate::WithinRange(1.0, 3.0).matches(2.0));
        assert!(!ThresholdPredicate::WithinRange(1.0, 3.0).matches(3.0));
        assert!(ThresholdPredicate::WithinRangeIncluded(1.0, 3.0).matches(3.0));
        assert!(ThresholdPredicate::OutsideRange(1.0, 3.0).matches(4.0));
        assert!(!ThresholdPredicate::OutsideRange(1.0, 3.0).matches(1.0));
        assert!(ThresholdPredicate::OutsideRangeIncluded(1.0, 3.0).matches(1.0));
        assert!(!ThresholdPredicate::Lt(5.0).matches(f64::NAN));
        assert!(!ThresholdPredicate::OutsideRange(1.0, 3.0).matches(f64::NAN));
    }

    #[test]
    fn test_classic_no_value() {
        assert!(ClassicPredicate::NoValue.matches(f64::NAN));
        assert!(!ClassicPredicate::NoValue.matches(0.0));
        assert!(!ClassicPredicate::Gt(0.0).matches(f64::NAN));
    }

    #[test]
    fn test_parse_classic_condition() {
        let json: ClassicConditionJson = serde_json::from_str(
            r#"{
                "evaluator": {"type": "within_range", "params": [10, 2]},
                "operator": {"type": "or"},
                "query": {"params": ["A"]},
                "reducer": {"type": "avg"}
            }"#,
        )
        .unwrap();

        let condition = ClassicCondition::try_from(&json).unwrap();
        assert_eq!(condition.ref_id, "A");
        assert_eq!(condition.reducer, ReducerId::from("avg"));
        assert_eq!(condition.predicate, ClassicPredicate::WithinRange(2.0, 10.0));
        assert_eq!(condition.combine, Combine::Or);
    }

    #[test]
    fn test_parse_threshold_condition_errors() {
        let json: ThresholdConditionJson =
            serde_json::from_str(r#"{"evaluator": {"type": "within_range", "params": [1]}}"#)
                .unwrap();
        let err = ThresholdCondition::try_from(&json).unwrap_err();
        assert!(err.contains("needs 2 parameter"), "{}", err);

        let json: ThresholdConditionJson = serde_json::from_str(
            r#"{"evaluator": {"type": "gt", "params": [1]}, "operator": {"type": "xor"}}"#,
        )
        .unwrap();
        assert!(ThresholdCondition::try_from(&json).is_err());

        let json: ThresholdConditionJson =
            serde_json::from_str(r#"{"evaluator": {"type": "no_value"}}"#).unwrap();
        assert!(ThresholdCondition::try_from(&json).is_err());
    }
}
