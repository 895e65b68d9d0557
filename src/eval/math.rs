//! Math evaluator
//!
//! Walks a `MathExpr` bottom-up. Every intermediate value is either a
//! literal scalar or a frame.
//!
//! # Broadcasting
//!
//! ```text
//! scalar  op scalar      -> scalar
//! scalar  op frame       -> elementwise over every field
//! frame   op frame       -> field i with field i (equal field counts)
//!                           or a single field against every field
//! series  op number set  -> the number set's value at every timestamp
//! series  op series      -> time axes must be identical
//! ```
//!
//! A missing value on either side gives a missing result; NaN flows through
//! the IEEE operators.

use std::borrow::Cow;

use super::{numeric, EvalEnv, Inputs};
use crate::expr::{BinaryOp, ExprError, ExprResult, MathExpr};
use crate::frame::{Field, FieldData, Frame};

/// Intermediate result
#[derive(Debug, Clone)]
enum Value<'a> {
    Scalar(f64),
    Frame(Cow<'a, Frame>),
}

/// Evaluate an expression; an all-literal expression yields a scalar frame
pub(crate) fn evaluate(
    ref_id: &str,
    expr: &MathExpr,
    inputs: &Inputs,
    env: &EvalEnv,
) -> ExprResult<Frame> {
    match eval(expr, inputs, env)? {
        Value::Scalar(v) => Ok(Frame::scalar(ref_id, v)),
        Value::Frame(frame) => Ok(frame.into_owned()),
    }
}

fn eval<'a>(expr: &MathExpr, inputs: &'a Inputs, env: &EvalEnv) -> ExprResult<Value<'a>> {
    match expr {
        MathExpr::Number(n) => Ok(Value::Scalar(*n)),
        MathExpr::Ref(id) => Ok(Value::Frame(Cow::Borrowed(inputs.get(id)?))),
        MathExpr::Neg(inner) => match eval(inner, inputs, env)? {
            Value::Scalar(v) => Ok(Value::Scalar(-v)),
            Value::Frame(frame) => map_frame(&frame, env, |v| -v).map(owned),
        },
        MathExpr::Binary { op, left, right } => {
            let lhs = eval(left, inputs, env)?;
            let rhs = eval(right, inputs, env)?;
            binary(*op, lhs, rhs, env)
        }
    }
}

fn owned<'a>(frame: Frame) -> Value<'a> {
    Value::Frame(Cow::Owned(frame))
}

fn binary<'a>(op: BinaryOp, lhs: Value<'a>, rhs: Value<'a>, env: &EvalEnv) -> ExprResult<Value<'a>> {
    match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(op.apply(a, b))),
        (Value::Frame(frame), Value::Scalar(b)) => map_frame(&frame, env, |a| op.apply(a, b)).map(owned),
        (Value::Scalar(a), Value::Frame(frame)) => map_frame(&frame, env, |b| op.apply(a, b)).map(owned),
        (Value::Frame(a), Value::Frame(b)) => combine_frames(op, &a, &b, env).map(owned),
    }
}

/// Apply `f` to every numeric value of every field
fn map_frame(frame: &Frame, env: &EvalEnv, f: impl Fn(f64) -> f64) -> ExprResult<Frame> {
    let mut fields = Vec::with_capacity(frame.fields.len());
    let mut step = 0usize;

    for field in &frame.fields {
        let values = numeric(field, "math")?;
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            env.checkpoint(step)?;
            step += 1;
            out.push(value.map(&f));
        }
        fields.push(with_values(field, out));
    }

    Ok(Frame {
        name: frame.name.clone(),
        time: frame.time.clone(),
        fields,
    })
}

/// Combine two frames field by field
fn combine_frames(op: BinaryOp, a: &Frame, b: &Frame, env: &EvalEnv) -> ExprResult<Frame> {
    let time = joint_time_axis(a, b)?;
    let rows = time.as_ref().map_or(1, Vec::len);

    let pairs: Vec<(&Field, &Field)> = match (a.fields.len(), b.fields.len()) {
        (n, m) if n == m => a.fields.iter().zip(&b.fields).collect(),
        (1, _) => b.fields.iter().map(|f| (&a.fields[0], f)).collect(),
        (_, 1) => a.fields.iter().map(|f| (f, &b.fields[0])).collect(),
        (n, m) => {
            return Err(ExprError::ShapeMismatch(format!(
                "cannot combine '{}' ({} fields) with '{}' ({} fields)",
                a.name, n, b.name, m
            )))
        }
    };

    // Output fields take their name and labels from the series side, or the
    // side with more fields
    let left_names = a.is_series() >= b.is_series() && a.fields.len() >= b.fields.len();

    let mut fields = Vec::with_capacity(pairs.len());
    let mut step = 0usize;

    for (fa, fb) in pairs {
        let va = numeric(fa, "math")?;
        let vb = numeric(fb, "math")?;
        let mut out = Vec::with_capacity(rows);

        for row in 0..rows {
            env.checkpoint(step)?;
            step += 1;
            let x = value_at(va, row);
            let y = value_at(vb, row);
            out.push(match (x, y) {
                (Some(x), Some(y)) => Some(op.apply(x, y)),
                _ => None,
            });
        }

        let template = if left_names { fa } else { fb };
        fields.push(with_values(template, out));
    }

    Ok(Frame {
        name: if left_names { a.name.clone() } else { b.name.clone() },
        time,
        fields,
    })
}

/// Value at `row`, broadcasting one-row (number set) fields
fn value_at(values: &[Option<f64>], row: usize) -> Option<f64> {
    if values.len() == 1 {
        values[0]
    } else {
        values.get(row).copied().flatten()
    }
}

fn joint_time_axis(a: &Frame, b: &Frame) -> ExprResult<Option<Vec<i64>>> {
    match (&a.time, &b.time) {
        (None, None) => Ok(None),
        (Some(t), None) | (None, Some(t)) => Ok(Some(t.clone())),
        (Some(ta), Some(tb)) if ta == tb => Ok(Some(ta.clone())),
        (Some(ta), Some(tb)) if ta.len() != tb.len() => Err(ExprError::ShapeMismatch(format!(
            "'{}' has {} rows but '{}' has {}",
            a.name,
            ta.len(),
            b.name,
            tb.len()
        ))),
        (Some(_), Some(_)) => Err(ExprError::ShapeMismatch(format!(
            "'{}' and '{}' have different time axes",
            a.name, b.name
        ))),
    }
}

fn with_values(template: &Field, values: Vec<Option<f64>>) -> Field {
    Field {
        name: template.name.clone(),
        labels: template.labels.clone(),
        data: FieldData::Number(values),
    }
}
