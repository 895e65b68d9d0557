//! Reduce evaluator
//!
//! Collapses every field of the input to one value, producing a number set
//! with one field per input field (names and labels kept).

use super::{numeric, EvalEnv, Inputs};
use crate::expr::ExprResult;
use crate::frame::{Field, FieldData, Frame};
use crate::reducer::{NonNumberPolicy, ReducerId};

pub(crate) fn evaluate(
    input: &str,
    reducer: &ReducerId,
    policy: NonNumberPolicy,
    inputs: &Inputs,
    env: &EvalEnv,
) -> ExprResult<Frame> {
    let reducer = env.registry.get(reducer)?;
    let frame = inputs.get(input)?;

    let mut fields = Vec::with_capacity(frame.fields.len());
    for (i, field) in frame.fields.iter().enumerate() {
        env.checkpoint(i)?;
        let values = numeric(field, "reduce")?;
        let value = reducer.reduce(values, policy);

        fields.push(Field {
            name: field.name.clone(),
            labels: field.labels.clone(),
            data: FieldData::Number(vec![Some(value)]),
        });
    }

    Ok(Frame {
        name: frame.name.clone(),
        time: None,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprError;

    fn input(values: Vec<Option<f64>>) -> Inputs {
        let time = (0..values.len() as i64).map(|i| i * 1000).collect();
        let frame = Frame::series("A", time, vec![Field::number("v", values).label("host", "a")]).unwrap();
        Inputs::new().with("A", frame)
    }

    fn reduce(id: &str, policy: NonNumberPolicy, inputs: &Inputs) -> ExprResult<f64> {
        let frame = evaluate("A", &ReducerId::from(id), policy, inputs, &EvalEnv::default())?;
        assert!(!frame.is_series());
        Ok(frame.fields[0].number_at(0).unwrap_or(f64::NAN))
    }

    #[test]
    fn test_mean_modes() {
        let inputs = input(vec![Some(1.0), Some(f64::NAN), Some(3.0)]);

        assert_eq!(reduce("mean", NonNumberPolicy::Drop, &inputs).unwrap(), 2.0);

        let replaced = reduce("mean", NonNumberPolicy::Replace(0.0), &inputs).unwrap();
        assert!((replaced - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_count_all_nan_dropped() {
        let inputs = input(vec![Some(f64::NAN), Some(f64::NAN)]);
        assert_eq!(reduce("count", NonNumberPolicy::Drop, &inputs).unwrap(), 0.0);
        assert!(reduce("sum", NonNumberPolicy::Drop, &inputs).unwrap().is_nan());
    }

    #[test]
    fn test_last_is_final_row() {
        let inputs = input(vec![Some(1.0), Some(5.0), None]);
        assert!(reduce("last", NonNumberPolicy::Drop, &inputs).unwrap().is_nan());

        let inputs = input(vec![Some(1.0), Some(5.0)]);
        assert_eq!(reduce("last", NonNumberPolicy::Strict, &inputs).unwrap(), 5.0);
    }

    #[test]
    fn test_one_value_per_field() {
        let frame = Frame::series(
            "A",
            vec![0, 1],
            vec![
                Field::from_f64("cpu", vec![1.0, 3.0]).label("host", "a"),
                Field::from_f64("cpu", vec![10.0, 30.0]).label("host", "b"),
            ],
        )
        .unwrap();
        let inputs = Inputs::new().with("A", frame);

        let out = evaluate("A", &ReducerId::from("max"), NonNumberPolicy::Strict, &inputs, &EvalEnv::default())
            .unwrap();
        assert_eq!(out.fields.len(), 2);
        assert_eq!(out.fields[1].number_at(0), Some(30.0));
        assert_eq!(out.fields[1].labels.get("host").map(String::as_str), Some("b"));
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_unknown_reducer() {
        let inputs = input(vec![Some(1.0)]);
        let err = reduce("p95", NonNumberPolicy::Strict, &inputs).unwrap_err();
        assert_eq!(err, ExprError::UnknownReducer("p95".to_string()));
    }

    #[test]
    fn test_string_field() {
        let frame = Frame::number_set("A", vec![Field::string("s", vec![None])]).unwrap();
        let inputs = Inputs::new().with("A", frame);
        let err = reduce("sum", NonNumberPolicy::Strict, &inputs).unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch(_)));
    }
}
