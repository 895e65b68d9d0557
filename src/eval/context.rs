//! Evaluation context
//!
//! Per-run map from RefID to outcome. Every key is written exactly once and
//! never mutated afterwards; workers for distinct nodes write concurrently
//! and read completed dependencies through shared `Arc<Frame>`s.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Inputs;
use crate::expr::{ExprError, ExprResult};
use crate::frame::Frame;

/// Recorded result of one node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Evaluated(Arc<Frame>),
    Failed(ExprError),
}

impl NodeOutcome {
    /// Frame, if the node succeeded
    pub fn frame(&self) -> Option<&Arc<Frame>> {
        match self {
            NodeOutcome::Evaluated(frame) => Some(frame),
            NodeOutcome::Failed(_) => None,
        }
    }

    /// Error, if the node failed
    pub fn error(&self) -> Option<&ExprError> {
        match self {
            NodeOutcome::Evaluated(_) => None,
            NodeOutcome::Failed(err) => Some(err),
        }
    }
}

/// Write-once, read-many store of node outcomes
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    outcomes: Arc<RwLock<HashMap<String, NodeOutcome>>>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's outcome; a second write for the same RefID is an error
    pub async fn record(&self, ref_id: &str, outcome: NodeOutcome) -> ExprResult<()> {
        let mut outcomes = self.outcomes.write().await;
        if outcomes.contains_key(ref_id) {
            return Err(ExprError::Execution(format!(
                "outcome for '{}' was already recorded",
                ref_id
            )));
        }
        outcomes.insert(ref_id.to_string(), outcome);
        Ok(())
    }

    /// Record a successful node
    pub async fn record_frame(&self, ref_id: &str, frame: Frame) -> ExprResult<Arc<Frame>> {
        let frame = Arc::new(frame);
        self.record(ref_id, NodeOutcome::Evaluated(frame.clone())).await?;
        Ok(frame)
    }

    /// Record a failed node
    pub async fn record_failure(&self, ref_id: &str, error: ExprError) -> ExprResult<()> {
        self.record(ref_id, NodeOutcome::Failed(error)).await
    }

    /// Outcome of a node
    pub async fn get(&self, ref_id: &str) -> Option<NodeOutcome> {
        self.outcomes.read().await.get(ref_id).cloned()
    }

    /// Frame of a successfully evaluated node
    pub async fn frame(&self, ref_id: &str) -> Option<Arc<Frame>> {
        self.outcomes
            .read()
            .await
            .get(ref_id)
            .and_then(|outcome| outcome.frame().cloned())
    }

    /// Collect the frames a node reads
    ///
    /// A dependency that was never recorded is `MissingDependency`; one
    /// that failed is `DependencyFailed`.
    pub async fn inputs_for<'a, I>(&self, ref_ids: I) -> ExprResult<Inputs>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let outcomes = self.outcomes.read().await;
        let mut inputs = Inputs::new();

        for ref_id in ref_ids {
            match outcomes.get(ref_id) {
                Some(NodeOutcome::Evaluated(frame)) => inputs.insert(ref_id.clone(), frame.clone()),
                Some(NodeOutcome::Failed(_)) => {
                    return Err(ExprError::DependencyFailed(ref_id.clone()))
                }
                None => return Err(ExprError::MissingDependency(ref_id.clone())),
            }
        }

        Ok(inputs)
    }

    /// Number of recorded nodes
    pub async fn len(&self) -> usize {
        self.outcomes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.outcomes.read().await.is_empty()
    }

    /// Copy out every recorded outcome
    pub async fn snapshot(&self) -> HashMap<String, NodeOutcome> {
        self.outcomes.read().await.clone()
    }
}
