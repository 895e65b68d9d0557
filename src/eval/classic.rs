//! Classic condition evaluator
//!
//! Legacy alerting: each condition reduces every series of its node (NaN
//! and missing values dropped, `last` included) and passes when any series' reduced value
//! matches. Conditions combine left to right into one 0/1 scalar.

use super::{numeric, EvalEnv, Inputs};
use crate::expr::{combine_conditions, ClassicCondition, ClassicPredicate, ExprResult};
use crate::frame::Frame;
use crate::reducer::NonNumberPolicy;

pub(crate) fn evaluate(
    ref_id: &str,
    conditions: &[ClassicCondition],
    inputs: &Inputs,
    env: &EvalEnv,
) -> ExprResult<Frame> {
    let mut results = Vec::with_capacity(conditions.len());

    for condition in conditions {
        results.push((condition.combine, condition_passes(condition, inputs, env)?));
    }

    let firing = combine_conditions(results).unwrap_or(false);
    Ok(Frame::scalar(ref_id, if firing { 1.0 } else { 0.0 }))
}

fn condition_passes(condition: &ClassicCondition, inputs: &Inputs, env: &EvalEnv) -> ExprResult<bool> {
    let reducer = env.registry.get(&condition.reducer)?;
    let frame = inputs.get(&condition.ref_id)?;

    if frame.fields.is_empty() {
        return Ok(condition.predicate == ClassicPredicate::NoValue);
    }

    for (i, field) in frame.fields.iter().enumerate() {
        env.checkpoint(i)?;
        let values = numeric(field, "classic condition")?;
        // Drop first so `last` reads the newest real sample
        let reduced = reducer.reduce_prepared(&NonNumberPolicy::Drop.prepare(values));
        if condition.predicate.matches(reduced) {
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Combine, ExprError};
    use crate::frame::Field;

    fn fired(frame: &Frame) -> bool {
        frame.fields[0].number_at(0) == Some(1.0)
    }

    fn inputs() -> Inputs {
        Inputs::new()
            .with("A", Frame::scalar("A", 10.0))
            .with("B", Frame::scalar("B", 1.0))
    }

    #[test]
    fn test_or_then_and() {
        let env = EvalEnv::default();

        // A > 5 OR B < 2: both true
        let conditions = vec![
            ClassicCondition::new("A", "last", ClassicPredicate::Gt(5.0)),
            ClassicCondition::new("B", "last", ClassicPredicate::Lt(2.0)).with_combine(Combine::Or),
        ];
        let out = evaluate("C", &conditions, &inputs(), &env).unwrap();
        assert!(fired(&out));
        assert_eq!(out.fields[0].name, "C");

        // A > 5 AND B > 2: second false
        let conditions = vec![
            ClassicCondition::new("A", "last", ClassicPredicate::Gt(5.0)),
            ClassicCondition::new("B", "last", ClassicPredicate::Gt(2.0)).with_combine(Combine::And),
        ];
        assert!(!fired(&evaluate("C", &conditions, &inputs(), &env).unwrap()));
    }

    #[test]
    fn test_first_operator_ignored() {
        let conditions = vec![
            ClassicCondition::new("A", "last", ClassicPredicate::Gt(5.0)).with_combine(Combine::And),
        ];
        assert!(fired(&evaluate("C", &conditions, &inputs(), &EvalEnv::default()).unwrap()));
    }

    #[test]
    fn test_any_series_passes() {
        let frame = Frame::series(
            "A",
            vec![0, 1, 2],
            vec![
                Field::from_f64("cpu", vec![1.0, 1.0, 1.0]).label("host", "a"),
                Field::number("cpu", vec![Some(50.0), None, Some(f64::NAN)]).label("host", "b"),
            ],
        )
        .unwrap();
        let inputs = Inputs::new().with("A", frame);

        // avg drops missing/NaN: host b reduces to 50
        let conditions = vec![ClassicCondition::new("A", "avg", ClassicPredicate::Gt(10.0))];
        assert!(fired(&evaluate("C", &conditions, &inputs, &EvalEnv::default()).unwrap()));
    }

    #[test]
    fn test_last_skips_trailing_missing() {
        let frame = Frame::series(
            "A",
            vec![0, 1, 2, 3],
            vec![Field::number("cpu", vec![Some(2.0), Some(90.0), Some(f64::NAN), None])],
        )
        .unwrap();
        let inputs = Inputs::new().with("A", frame);
        let env = EvalEnv::default();

        let conditions = vec![ClassicCondition::new("A", "last", ClassicPredicate::Gt(80.0))];
        assert!(fired(&evaluate("C", &conditions, &inputs, &env).unwrap()));

        let conditions = vec![ClassicCondition::new("A", "last", ClassicPredicate::NoValue)];
        assert!(!fired(&evaluate("C", &conditions, &inputs, &env).unwrap()));
    }

    #[test]
    fn test_no_value() {
        let empty = Frame::number_set("A", vec![]).unwrap();
        let all_nan = Frame::series("B", vec![0], vec![Field::number("v", vec![None])]).unwrap();
        let inputs = Inputs::new().with("A", empty).with("B", all_nan);
        let env = EvalEnv::default();

        let conditions = vec![ClassicCondition::new("A", "avg", ClassicPredicate::NoValue)];
        assert!(fired(&evaluate("C", &conditions, &inputs, &env).unwrap()));

        let conditions = vec![ClassicCondition::new("B", "avg", ClassicPredicate::NoValue)];
        assert!(fired(&evaluate("C", &conditions, &inputs, &env).unwrap()));

        let conditions = vec![ClassicCondition::new("A", "avg", ClassicPredicate::Gt(0.0))];
        assert!(!fired(&evaluate("C", &conditions, &inputs, &env).unwrap()));
    }

    #[test]
    fn test_unknown_reducer() {
        let conditions = vec![ClassicCondition::new("A", "p99", ClassicPredicate::Gt(5.0))];
        let err = evaluate("C", &conditions, &inputs(), &EvalEnv::default()).unwrap_err();
        assert_eq!(err, ExprError::UnknownReducer("p99".to_string()));
    }
}
