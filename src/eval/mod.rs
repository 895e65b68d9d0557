//! Node evaluation
//!
//! One evaluator per expression type. Each is a pure function of the node,
//! the frames it reads (`Inputs`) and the run environment (`EvalEnv`):
//!
//! - **math**: elementwise arithmetic with broadcasting
//! - **reduce**: one scalar per field
//! - **resample**: fixed-width time buckets
//! - **threshold**: pointwise 0/1 conditions
//! - **classic**: legacy multi-condition firing signal
//!
//! `EvaluationContext` holds the outcomes of a run.

mod cancel;
mod classic;
mod context;
mod math;
mod reduce;
mod resample;
mod threshold;

pub use cancel::CancelToken;
pub use context::{EvaluationContext, NodeOutcome};

use std::collections::HashMap;
use std::sync::Arc;

use crate::expr::{ExprError, ExprResult, NodeKind, QueryNode};
use crate::frame::{Field, Frame};
use crate::reducer::ReducerRegistry;

/// Rows (or buckets) processed between cancellation polls
pub const DEFAULT_CHECK_INTERVAL: usize = 1024;

/// Run-wide evaluation environment
#[derive(Debug, Clone)]
pub struct EvalEnv {
    /// Reducers available to reduce, resample and classic nodes
    pub registry: Arc<ReducerRegistry>,
    pub cancel: CancelToken,
    /// Rows between cancellation polls
    pub check_interval: usize,
}

impl Default for EvalEnv {
    fn default() -> Self {
        Self::new(Arc::new(ReducerRegistry::default()))
    }
}

impl EvalEnv {
    pub fn new(registry: Arc<ReducerRegistry>) -> Self {
        Self {
            registry,
            cancel: CancelToken::new(),
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Builder method: share a cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builder method: set the polling interval (minimum 1)
    pub fn with_check_interval(mut self, interval: usize) -> Self {
        self.check_interval = interval.max(1);
        self
    }

    /// Poll the cancellation token every `check_interval` steps
    #[inline]
    pub fn checkpoint(&self, step: usize) -> ExprResult<()> {
        if step % self.check_interval.max(1) == 0 {
            self.cancel.check()
        } else {
            Ok(())
        }
    }
}

/// Frames a node reads, keyed by RefID
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    frames: HashMap<String, Arc<Frame>>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a frame
    pub fn insert(&mut self, ref_id: impl Into<String>, frame: Arc<Frame>) {
        self.frames.insert(ref_id.into(), frame);
    }

    /// Builder method: add a frame
    pub fn with(mut self, ref_id: impl Into<String>, frame: Frame) -> Self {
        self.insert(ref_id, Arc::new(frame));
        self
    }

    /// Frame bound to a RefID
    pub fn get(&self, ref_id: &str) -> ExprResult<&Frame> {
        self.frames
            .get(ref_id)
            .map(|frame| frame.as_ref())
            .ok_or_else(|| ExprError::MissingDependency(ref_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FromIterator<(String, Frame)> for Inputs {
    fn from_iter<I: IntoIterator<Item = (String, Frame)>>(iter: I) -> Self {
        Self {
            frames: iter
                .into_iter()
                .map(|(id, frame)| (id, Arc::new(frame)))
                .collect(),
        }
    }
}

/// Evaluate one expression node
///
/// The output frame is named after the node. Base nodes have no evaluator:
/// their frames come from the caller.
pub fn evaluate_node(node: &QueryNode, inputs: &Inputs, env: &EvalEnv) -> ExprResult<Frame> {
    env.cancel.check()?;

    let frame = match &node.kind {
        NodeKind::Math { ast, .. } => math::evaluate(&node.ref_id, ast, inputs, env)?,
        NodeKind::Reduce {
            input,
            reducer,
            policy,
        } => reduce::evaluate(input, reducer, *policy, inputs, env)?,
        NodeKind::Resample {
            input,
            window,
            downsampler,
            upsampler,
        } => resample::evaluate(input, window, downsampler, *upsampler, inputs, env)?,
        NodeKind::Threshold { input, conditions } => {
            threshold::evaluate(input, conditions, inputs, env)?
        }
        NodeKind::Classic { conditions } => classic::evaluate(&node.ref_id, conditions, inputs, env)?,
        NodeKind::Base { query_type } => {
            return Err(ExprError::Execution(format!(
                "'{}' is a {} query; its frame must be supplied by the caller",
                node.ref_id, query_type
            )))
        }
    };

    Ok(frame.named(&node.ref_id))
}

/// Firing state of a threshold or classic node's output
///
/// True when any field's last value is 1. `None` for other node kinds.
pub fn firing_state(node: &QueryNode, frame: &Frame) -> Option<bool> {
    if !node.is_condition() {
        return None;
    }
    let firing = match frame.row_count().checked_sub(1) {
        Some(last) => frame
            .fields
            .iter()
            .any(|field| field.number_at(last) == Some(1.0)),
        None => false,
    };
    Some(firing)
}

/// Numeric values of a field, or `TypeMismatch`
pub(crate) fn numeric<'a>(field: &'a Field, context: &str) -> ExprResult<&'a [Option<f64>]> {
    field.numbers().ok_or_else(|| {
        ExprError::TypeMismatch(format!(
            "{}: field '{}' holds {} values",
            context,
            field.name,
            field.data.type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ClassicCondition, ClassicPredicate};

    #[test]
    fn test_checkpoint_interval() {
        let env = EvalEnv::default().with_check_interval(4);
        env.cancel.cancel();

        assert_eq!(env.checkpoint(0), Err(ExprError::Cancelled));
        assert_eq!(env.checkpoint(3), Ok(()));
        assert_eq!(env.checkpoint(8), Err(ExprError::Cancelled));
    }

    #[test]
    fn test_evaluate_node_names_output() {
        let node = QueryNode::math("B", "$A * 2").unwrap();
        let inputs = Inputs::new().with("A", Frame::scalar("A", 21.0));

        let frame = evaluate_node(&node, &inputs, &EvalEnv::default()).unwrap();
        assert_eq!(frame.name, "B");
        assert_eq!(frame.fields[0].number_at(0), Some(42.0));
    }

    #[test]
    fn test_base_node_is_not_evaluated() {
        let node = QueryNode::base("A", "prometheus").unwrap();
        let err = evaluate_node(&node, &Inputs::new(), &EvalEnv::default()).unwrap_err();
        assert!(matches!(err, ExprError::Execution(_)));
    }

    #[test]
    fn test_cancelled_before_start() {
        let node = QueryNode::math("B", "1 + 1").unwrap();
        let env = EvalEnv::default();
        env.cancel.cancel();

        let err = evaluate_node(&node, &Inputs::new(), &env).unwrap_err();
        assert_eq!(err, ExprError::Cancelled);
    }

    #[test]
    fn test_firing_state() {
        let node = QueryNode::classic(
            "C",
            vec![ClassicCondition::new("A", "last", ClassicPredicate::Gt(0.0))],
        )
        .unwrap();

        assert_eq!(firing_state(&node, &Frame::scalar("C", 1.0)), Some(true));
        assert_eq!(firing_state(&node, &Frame::scalar("C", 0.0)), Some(false));

        let math = QueryNode::math("M", "1").unwrap();
        assert_eq!(firing_state(&math, &Frame::scalar("M", 1.0)), None);
    }
}
