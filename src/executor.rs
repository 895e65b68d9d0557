//! Evaluation executor
//!
//! Drives one run: validate nodes, build the dependency graph, schedule it,
//! bind base frames, then evaluate level by level. Nodes in one level do
//! not depend on each other and run concurrently on blocking worker threads
//! when parallelism is enabled.
//!
//! ```text
//! Built -> Validated -> Scheduled -> Evaluating -> Done
//!                                              \-> Failed
//! ```
//!
//! Graph errors fail the run before anything is evaluated. A failing node
//! either aborts the run (`FailurePolicy::Abort`) or is recorded together
//! with every node downstream of it (`FailurePolicy::SkipDependents`).
//! Cancellation always aborts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::EngineConfig;
use crate::eval::{evaluate_node, firing_state, CancelToken, EvalEnv, EvaluationContext, NodeOutcome};
use crate::expr::{ErrorKind, ExprError, ExprResult, QueryNode, RawQueryNode};
use crate::frame::Frame;
use crate::graph::{DependencyGraph, Schedule};
use crate::reducer::ReducerRegistry;

/// What a node failure does to the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole run
    #[default]
    Abort,
    /// Record the failure, skip everything downstream, keep evaluating the rest
    SkipDependents,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip_dependents" | "skip" => Ok(Self::SkipDependents),
            other => Err(format!("unknown failure policy '{}'", other)),
        }
    }
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Built,
    Validated,
    Scheduled,
    Evaluating,
    Done,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Built => "built",
            Self::Validated => "validated",
            Self::Scheduled => "scheduled",
            Self::Evaluating => "evaluating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Input of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Nodes in declaration order
    pub queries: Vec<RawQueryNode>,
    /// Already-fetched frames for the base nodes, keyed by RefID
    #[serde(default)]
    pub frames: BTreeMap<String, Frame>,
}

impl EvaluationRequest {
    pub fn new(queries: Vec<RawQueryNode>) -> Self {
        Self {
            queries,
            frames: BTreeMap::new(),
        }
    }

    /// Parse a request from JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Builder method: supply a base frame
    pub fn with_frame(mut self, ref_id: impl Into<String>, frame: Frame) -> Self {
        self.frames.insert(ref_id.into(), frame);
        self
    }
}

/// A failed node as reported in results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ExprError> for NodeError {
    fn from(err: &ExprError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Output of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResults {
    /// Every evaluated frame (base frames included), each named by its RefID
    pub frames: BTreeMap<String, Frame>,
    /// Failed or skipped nodes; only populated under `SkipDependents`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, NodeError>,
    /// Firing state of every evaluated threshold and classic node
    pub firing: BTreeMap<String, bool>,
}

impl EvaluationResults {
    /// Frame of a node
    pub fn frame(&self, ref_id: &str) -> Option<&Frame> {
        self.frames.get(ref_id)
    }

    /// Whether any condition node is firing
    pub fn any_firing(&self) -> bool {
        self.firing.values().any(|&f| f)
    }
}

/// Structured failure of a run
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("evaluation failed at '{ref_id}': {message}")]
pub struct RunFailure {
    /// Offending node
    pub ref_id: String,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip)]
    pub error: ExprError,
    /// Firing state of condition nodes that completed before the failure
    pub firing: BTreeMap<String, bool>,
}

impl RunFailure {
    fn new(ref_id: impl Into<String>, error: ExprError) -> Self {
        Self {
            ref_id: ref_id.into(),
            kind: error.kind(),
            message: error.to_string(),
            error,
            firing: BTreeMap::new(),
        }
    }

    fn with_firing(mut self, firing: BTreeMap<String, bool>) -> Self {
        self.firing = firing;
        self
    }
}

/// Validated and scheduled node set
#[derive(Debug, Clone)]
pub struct Plan {
    nodes: Vec<QueryNode>,
    graph: DependencyGraph,
    schedule: Schedule,
}

impl Plan {
    /// Validate, build and schedule raw nodes
    pub fn build(raw: Vec<RawQueryNode>) -> Result<Self, RunFailure> {
        let mut nodes = Vec::with_capacity(raw.len());
        for node in raw {
            let ref_id = node.ref_id.clone();
            nodes.push(QueryNode::try_from(node).map_err(|e| RunFailure::new(ref_id, e))?);
        }
        tracing::debug!(state = %RunState::Validated, nodes = nodes.len(), "Nodes validated");

        let graph = DependencyGraph::build(&nodes).map_err(graph_failure)?;
        let schedule = graph.schedule().map_err(graph_failure)?;
        tracing::debug!(
            state = %RunState::Scheduled,
            levels = schedule.levels().len(),
            "Graph scheduled"
        );

        Ok(Self {
            nodes,
            graph,
            schedule,
        })
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[QueryNode] {
        &self.nodes
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Node by RefID
    pub fn node(&self, ref_id: &str) -> Option<&QueryNode> {
        self.graph.index_of(ref_id).map(|i| &self.nodes[i])
    }
}

/// Attribute a graph error to the node it concerns
fn graph_failure(error: ExprError) -> RunFailure {
    let ref_id = match &error {
        ExprError::UnresolvedReference { referenced_by, .. } => referenced_by.clone(),
        ExprError::SelfReference(id) | ExprError::DuplicateRefId(id) => id.clone(),
        ExprError::CycleDetected(cycle) => cycle.first().cloned().unwrap_or_default(),
        ExprError::InvalidNode { ref_id, .. } => ref_id.clone(),
        _ => String::new(),
    };
    RunFailure::new(ref_id, error)
}

/// Runs evaluation requests
#[derive(Debug, Clone)]
pub struct Executor {
    config: EngineConfig,
    registry: Arc<ReducerRegistry>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Executor {
    /// Executor with the default reducers
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ReducerRegistry::default()),
        }
    }

    /// Builder method: use a custom reducer registry
    pub fn with_registry(mut self, registry: Arc<ReducerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ReducerRegistry> {
        &self.registry
    }

    /// Evaluate a request, honouring the configured timeout
    pub async fn execute(&self, request: EvaluationRequest) -> Result<EvaluationResults, RunFailure> {
        let cancel = match self.config.timeout_ms {
            Some(ms) => CancelToken::with_timeout(Duration::from_millis(ms)),
            None => CancelToken::new(),
        };
        self.execute_with_cancel(request, cancel).await
    }

    /// Evaluate a request under a caller-owned cancellation token
    pub async fn execute_with_cancel(
        &self,
        request: EvaluationRequest,
        cancel: CancelToken,
    ) -> Result<EvaluationResults, RunFailure> {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("evaluation", run_id = %run_id);

        async move {
            let started = Instant::now();
            tracing::debug!(state = %RunState::Built, nodes = request.queries.len(), "Run created");

            let result = match Plan::build(request.queries) {
                Ok(plan) => self.run(&plan, request.frames, cancel).await,
                Err(failure) => Err(failure),
            };

            match &result {
                Ok(results) => tracing::info!(
                    state = %RunState::Done,
                    frames = results.frames.len(),
                    failures = results.failures.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Evaluation complete"
                ),
                Err(failure) => tracing::warn!(
                    state = %RunState::Failed,
                    ref_id = %failure.ref_id,
                    kind = %failure.kind,
                    "Evaluation failed: {}",
                    failure.message
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        plan: &Plan,
        mut frames: BTreeMap<String, Frame>,
        cancel: CancelToken,
    ) -> Result<EvaluationResults, RunFailure> {
        let ctx = EvaluationContext::new();
        let env = EvalEnv::new(self.registry.clone())
            .with_cancel(cancel.clone())
            .with_check_interval(self.config.cancel_check_interval);
        let mut skipped: HashSet<String> = HashSet::new();

        tracing::debug!(state = %RunState::Evaluating, "Binding base frames");

        // Base frames are the leaves; a missing or malformed one fails that node
        let mut failed = Vec::new();
        for node in plan.nodes.iter().filter(|n| n.is_base()) {
            let outcome = match frames.remove(&node.ref_id) {
                Some(frame) => match frame.validate() {
                    Ok(()) => Ok(frame.named(&node.ref_id)),
                    Err(e) => Err(ExprError::invalid_node(&node.ref_id, e.to_string())),
                },
                None => Err(ExprError::MissingDependency(node.ref_id.clone())),
            };
            match outcome {
                Ok(frame) => {
                    self.record(&ctx, &node.ref_id, NodeOutcome::Evaluated(Arc::new(frame)))
                        .await?;
                }
                Err(e) => failed.push((node.ref_id.clone(), e)),
            }
        }
        for unused in frames.keys() {
            tracing::warn!(ref_id = %unused, "Frame supplied for an unknown base node, ignoring");
        }
        self.handle_failures(plan, &ctx, failed, &mut skipped).await?;

        for (level_no, level) in plan.schedule.levels().iter().enumerate() {
            let pending: Vec<&QueryNode> = level
                .iter()
                .filter_map(|id| plan.node(id))
                .filter(|node| !node.is_base() && !skipped.contains(&node.ref_id))
                .collect();

            if pending.is_empty() {
                continue;
            }

            if let Err(e) = cancel.check() {
                return Err(self.fail(plan, &ctx, &pending[0].ref_id, e).await);
            }

            tracing::debug!(level = level_no, nodes = pending.len(), "Evaluating level");

            let results = if self.config.parallel && pending.len() > 1 {
                self.evaluate_parallel(&pending, &ctx, &env).await
            } else {
                self.evaluate_sequential(&pending, &ctx, &env).await
            };

            let mut failed = Vec::new();
            for (node, result) in pending.iter().zip(results) {
                match result {
                    Ok(frame) => {
                        tracing::debug!(ref_id = %node.ref_id, kind = node.query_type(), "Node evaluated");
                        self.record(&ctx, &node.ref_id, NodeOutcome::Evaluated(Arc::new(frame)))
                            .await?;
                    }
                    Err(e) => failed.push((node.ref_id.clone(), e)),
                }
            }
            self.handle_failures(plan, &ctx, failed, &mut skipped).await?;
        }

        Ok(self.results(plan, &ctx).await)
    }

    async fn evaluate_sequential(
        &self,
        nodes: &[&QueryNode],
        ctx: &EvaluationContext,
        env: &EvalEnv,
    ) -> Vec<ExprResult<Frame>> {
        let mut results = Vec::with_capacity(nodes.len());
        for node in nodes {
            let result = match ctx.inputs_for(node.references()).await {
                Ok(inputs) => evaluate_node(node, &inputs, env),
                Err(e) => Err(e),
            };
            results.push(result);
        }
        results
    }

    /// Evaluate independent nodes on blocking threads, at most
    /// `max_parallelism` at a time; results come back in input order
    async fn evaluate_parallel(
        &self,
        nodes: &[&QueryNode],
        ctx: &EvaluationContext,
        env: &EvalEnv,
    ) -> Vec<ExprResult<Frame>> {
        let slots = Arc::new(Semaphore::new(self.config.max_parallelism.max(1)));
        let mut set = JoinSet::new();
        let mut results: Vec<Option<ExprResult<Frame>>> = vec![None; nodes.len()];

        for (i, node) in nodes.iter().enumerate() {
            let inputs = match ctx.inputs_for(node.references()).await {
                Ok(inputs) => inputs,
                Err(e) => {
                    results[i] = Some(Err(e));
                    continue;
                }
            };
            let node = (*node).clone();
            let env = env.clone();
            let slots = slots.clone();

            set.spawn(async move {
                let result = match slots.acquire_owned().await {
                    Ok(_permit) => {
                        let ref_id = node.ref_id.clone();
                        tokio::task::spawn_blocking(move || evaluate_node(&node, &inputs, &env))
                            .await
                            .unwrap_or_else(|e| {
                                Err(ExprError::Execution(format!(
                                    "evaluator for '{}' did not complete: {}",
                                    ref_id, e
                                )))
                            })
                    }
                    Err(e) => Err(ExprError::Execution(format!("failed to acquire worker slot: {}", e))),
                };
                (i, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, result)) => results[i] = Some(result),
                Err(e) => tracing::error!(error = %e, "Evaluation task failed"),
            }
        }

        results
            .into_iter()
            .zip(nodes)
            .map(|(result, node)| {
                result.unwrap_or_else(|| {
                    Err(ExprError::Execution(format!(
                        "no result for '{}'",
                        node.ref_id
                    )))
                })
            })
            .collect()
    }

    /// Apply the failure policy to the failures of one level
    async fn handle_failures(
        &self,
        plan: &Plan,
        ctx: &EvaluationContext,
        failed: Vec<(String, ExprError)>,
        skipped: &mut HashSet<String>,
    ) -> Result<(), RunFailure> {
        // Declaration order decides which failure is reported
        let mut failed = failed;
        failed.sort_by_key(|(id, _)| plan.graph.index_of(id));

        for (ref_id, error) in failed {
            tracing::warn!(ref_id = %ref_id, kind = %error.kind(), "Node failed: {}", error);

            let abort = self.config.failure_policy == FailurePolicy::Abort
                || error == ExprError::Cancelled;
            if abort {
                return Err(self.fail(plan, ctx, &ref_id, error).await);
            }

            self.record(ctx, &ref_id, NodeOutcome::Failed(error)).await?;
            for dependent in plan.graph.downstream_of(&[ref_id.as_str()]) {
                if skipped.insert(dependent.clone()) {
                    tracing::debug!(ref_id = %dependent, failed = %ref_id, "Skipping dependent");
                    let skip = ExprError::DependencyFailed(ref_id.clone());
                    self.record(ctx, &dependent, NodeOutcome::Failed(skip)).await?;
                }
            }
        }
        Ok(())
    }

    async fn record(
        &self,
        ctx: &EvaluationContext,
        ref_id: &str,
        outcome: NodeOutcome,
    ) -> Result<(), RunFailure> {
        ctx.record(ref_id, outcome)
            .await
            .map_err(|e| RunFailure::new(ref_id, e))
    }

    async fn fail(&self, plan: &Plan, ctx: &EvaluationContext, ref_id: &str, error: ExprError) -> RunFailure {
        RunFailure::new(ref_id, error).with_firing(self.firing(plan, ctx).await)
    }

    async fn firing(&self, plan: &Plan, ctx: &EvaluationContext) -> BTreeMap<String, bool> {
        let mut firing = BTreeMap::new();
        for node in plan.nodes.iter().filter(|n| n.is_condition()) {
            if let Some(frame) = ctx.frame(&node.ref_id).await {
                if let Some(state) = firing_state(node, &frame) {
                    firing.insert(node.ref_id.clone(), state);
                }
            }
        }
        firing
    }

    async fn results(&self, plan: &Plan, ctx: &EvaluationContext) -> EvaluationResults {
        let mut frames = BTreeMap::new();
        let mut failures = BTreeMap::new();

        for (ref_id, outcome) in ctx.snapshot().await {
            match outcome {
                NodeOutcome::Evaluated(frame) => {
                    frames.insert(ref_id, Arc::unwrap_or_clone(frame));
                }
                NodeOutcome::Failed(err) => {
                    failures.insert(ref_id, NodeError::from(&err));
                }
            }
        }

        EvaluationResults {
            frames,
            failures,
            firing: self.firing(plan, ctx).await,
        }
    }
}
