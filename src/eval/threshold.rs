//! Threshold evaluator
//!
//! Tests every value of the input against the condition list and emits 1
//! where the combined result holds, 0 where it does not. Shape, time axis,
//! field names and labels are those of the input. Missing values stay
//! missing.

use super::{numeric, EvalEnv, Inputs};
use crate::expr::{combine_conditions, ExprResult, ThresholdCondition};
use crate::frame::{Field, FieldData, Frame};

pub(crate) fn evaluate(
    input: &str,
    conditions: &[ThresholdCondition],
    inputs: &Inputs,
    env: &EvalEnv,
) -> ExprResult<Frame> {
    let frame = inputs.get(input)?;

    let mut fields = Vec::with_capacity(frame.fields.len());
    let mut step = 0usize;

    for field in &frame.fields {
        let values = numeric(field, "threshold")?;
        let mut out = Vec::with_capacity(values.len());

        for value in values {
            env.checkpoint(step)?;
            step += 1;
            out.push(value.map(|v| {
                let passed = combine_conditions(
                    conditions
                        .iter()
                        .map(|c| (c.combine, c.predicate.matches(v))),
                )
                .unwrap_or(false);
                if passed {
                    1.0
                } else {
                    0.0
                }
            }));
        }

        fields.push(Field {
            name: field.name.clone(),
            labels: field.labels.clone(),
            data: FieldData::Number(out),
        });
    }

    Ok(Frame {
        name: frame.name.clone(),
        time: frame.time.clone(),
        fields,
    })
}
