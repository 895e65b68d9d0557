//! Query nodes
//!
//! A node arrives as loosely typed JSON (`refId`, `queryType`, payload
//! fields). `RawQueryNode` captures that shape; converting it into a
//! `QueryNode` validates the payload against the declared type and extracts
//! the node's references, so evaluators never inspect JSON.
//!
//! Any `queryType` other than the five expression types marks a base node:
//! a leaf whose frame is fetched by the data-source layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::expr::ast::MathExpr;
use crate::expr::condition::{
    ClassicCondition, ClassicConditionJson, ThresholdCondition, ThresholdConditionJson,
};
use crate::expr::error::{ExprError, ExprResult};
use crate::expr::parser::parse_math;
use crate::expr::refs::single_reference;
use crate::reducer::{NonNumberPolicy, ReduceSettings, ReducerId, Upsampler};

/// Node as received from the API layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQueryNode {
    #[serde(rename = "refId")]
    pub ref_id: String,
    #[serde(rename = "queryType", default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    /// Type-specific fields
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// `queryType = math`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathQuery {
    pub expression: String,
}

/// `queryType = reduce`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReduceQuery {
    /// Reference to a single query result
    pub expression: String,
    pub reducer: ReducerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ReduceSettings>,
}

/// `queryType = resample`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleQuery {
    pub expression: String,
    /// Bucket width (`1m`, `10m`, `1w`, ...)
    pub window: String,
    pub downsampler: String,
    pub upsampler: String,
}

/// `queryType = threshold`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdQuery {
    /// Reference to a single query result
    pub expression: String,
    pub conditions: Vec<ThresholdConditionJson>,
}

/// `queryType = classic`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicQuery {
    pub conditions: Vec<ClassicConditionJson>,
}

/// Validated node payload, one variant per query type
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Math {
        expression: String,
        ast: MathExpr,
    },
    Reduce {
        input: String,
        reducer: ReducerId,
        policy: NonNumberPolicy,
    },
    Resample {
        input: String,
        /// Parsed when the node is evaluated
        window: String,
        downsampler: ReducerId,
        upsampler: Upsampler,
    },
    Threshold {
        input: String,
        conditions: Vec<ThresholdCondition>,
    },
    Classic {
        conditions: Vec<ClassicCondition>,
    },
    /// Leaf whose frame is supplied by the caller
    Base {
        query_type: String,
    },
}

impl NodeKind {
    /// Wire name of the query type
    pub fn query_type(&self) -> &str {
        match self {
            NodeKind::Math { .. } => "math",
            NodeKind::Reduce { .. } => "reduce",
            NodeKind::Resample { .. } => "resample",
            NodeKind::Threshold { .. } => "threshold",
            NodeKind::Classic { .. } => "classic",
            NodeKind::Base { query_type } => query_type,
        }
    }
}

/// A validated graph node
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    pub ref_id: String,
    pub kind: NodeKind,
    references: BTreeSet<String>,
}

impl QueryNode {
    /// Parse and validate a node from JSON
    pub fn from_json(json: &str) -> ExprResult<Self> {
        let raw: RawQueryNode = serde_json::from_str(json)
            .map_err(|e| ExprError::invalid_node("<unknown>", e.to_string()))?;
        Self::try_from(raw)
    }

    /// Math node
    pub fn math(ref_id: impl Into<String>, expression: impl Into<String>) -> ExprResult<Self> {
        let expression = expression.into();
        let ast = parse_math(&expression)?;
        let references = ast.references();
        Self::new(ref_id, NodeKind::Math { expression, ast }, references)
    }

    /// Reduce node; `settings = None` is strict mode
    pub fn reduce(
        ref_id: impl Into<String>,
        expression: &str,
        reducer: impl Into<ReducerId>,
        settings: Option<ReduceSettings>,
    ) -> ExprResult<Self> {
        let ref_id = ref_id.into();
        let policy = match settings {
            Some(settings) => settings
                .policy()
                .map_err(|reason| ExprError::invalid_node(&ref_id, reason))?,
            None => NonNumberPolicy::Strict,
        };
        let input = single_reference(expression)?;
        let references = BTreeSet::from([input.clone()]);
        let kind = NodeKind::Reduce {
            input,
            reducer: reducer.into(),
            policy,
        };
        Self::new(ref_id, kind, references)
    }

    /// Resample node
    pub fn resample(
        ref_id: impl Into<String>,
        expression: &str,
        window: impl Into<String>,
        downsampler: impl Into<ReducerId>,
        upsampler: &str,
    ) -> ExprResult<Self> {
        let ref_id = ref_id.into();
        let window = window.into();
        if window.trim().is_empty() {
            return Err(ExprError::invalid_node(ref_id, "window is empty"));
        }
        let upsampler = upsampler
            .parse::<Upsampler>()
            .map_err(|reason| ExprError::invalid_node(&ref_id, reason))?;
        let input = single_reference(expression)?;
        let references = BTreeSet::from([input.clone()]);
        let kind = NodeKind::Resample {
            input,
            window,
            downsampler: downsampler.into(),
            upsampler,
        };
        Self::new(ref_id, kind, references)
    }

    /// Threshold node
    pub fn threshold(
        ref_id: impl Into<String>,
        expression: &str,
        conditions: Vec<ThresholdCondition>,
    ) -> ExprResult<Self> {
        let ref_id = ref_id.into();
        if conditions.is_empty() {
            return Err(ExprError::invalid_node(ref_id, "threshold needs at least one condition"));
        }
        let input = single_reference(expression)?;
        let references = BTreeSet::from([input.clone()]);
        Self::new(ref_id, NodeKind::Threshold { input, conditions }, references)
    }

    /// Classic condition node
    pub fn classic(ref_id: impl Into<String>, conditions: Vec<ClassicCondition>) -> ExprResult<Self> {
        let ref_id = ref_id.into();
        if conditions.is_empty() {
            return Err(ExprError::invalid_node(ref_id, "classic needs at least one condition"));
        }
        let references = conditions.iter().map(|c| c.ref_id.clone()).collect();
        Self::new(ref_id, NodeKind::Classic { conditions }, references)
    }

    /// Base (data-source) node
    pub fn base(ref_id: impl Into<String>, query_type: impl Into<String>) -> ExprResult<Self> {
        let kind = NodeKind::Base {
            query_type: query_type.into(),
        };
        Self::new(ref_id, kind, BTreeSet::new())
    }

    fn new(
        ref_id: impl Into<String>,
        kind: NodeKind,
        references: BTreeSet<String>,
    ) -> ExprResult<Self> {
        let ref_id = ref_id.into();
        if ref_id.trim().is_empty() {
            return Err(ExprError::invalid_node(ref_id, "refId is empty"));
        }
        Ok(Self {
            ref_id,
            kind,
            references,
        })
    }

    /// RefIDs this node reads
    pub fn references(&self) -> &BTreeSet<String> {
        &self.references
    }

    /// Wire name of the query type
    pub fn query_type(&self) -> &str {
        self.kind.query_type()
    }

    /// Whether the node is a data-source leaf
    pub fn is_base(&self) -> bool {
        matches!(self.kind, NodeKind::Base { .. })
    }

    /// Whether the node produces a firing signal
    pub fn is_condition(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Threshold { .. } | NodeKind::Classic { .. }
        )
    }
}

impl TryFrom<RawQueryNode> for QueryNode {
    type Error = ExprError;

    fn try_from(raw: RawQueryNode) -> Result<Self, Self::Error> {
        let ref_id = raw.ref_id;
        let query_type = raw.query_type.unwrap_or_default();
        let payload = serde_json::Value::Object(raw.payload);

        match query_type.as_str() {
            "math" => {
                let q: MathQuery = decode(&ref_id, payload)?;
                non_empty(&ref_id, &q.expression)?;
                QueryNode::math(ref_id, q.expression)
            }
            "reduce" => {
                let q: ReduceQuery = decode(&ref_id, payload)?;
                non_empty(&ref_id, &q.expression)?;
                QueryNode::reduce(ref_id, &q.expression, q.reducer, q.settings)
            }
            "resample" => {
                let q: ResampleQuery = decode(&ref_id, payload)?;
                non_empty(&ref_id, &q.expression)?;
                QueryNode::resample(ref_id, &q.expression, q.window, q.downsampler.as_str(), &q.upsampler)
            }
            "threshold" => {
                let q: ThresholdQuery = decode(&ref_id, payload)?;
                non_empty(&ref_id, &q.expression)?;
                let conditions = q
                    .conditions
                    .iter()
                    .map(ThresholdCondition::try_from)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|reason| ExprError::invalid_node(&ref_id, reason))?;
                QueryNode::threshold(ref_id, &q.expression, conditions)
            }
            "classic" => {
                let q: ClassicQuery = decode(&ref_id, payload)?;
                let conditions = q
                    .conditions
                    .iter()
                    .map(ClassicCondition::try_from)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|reason| ExprError::invalid_node(&ref_id, reason))?;
                QueryNode::classic(ref_id, conditions)
            }
            _ => QueryNode::base(ref_id, query_type),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(ref_id: &str, payload: serde_json::Value) -> ExprResult<T> {
    serde_json::from_value(payload).map_err(|e| ExprError::invalid_node(ref_id, e.to_string()))
}

fn non_empty(ref_id: &str, expression: &str) -> ExprResult<()> {
    if expression.trim().is_empty() {
        return Err(ExprError::invalid_node(ref_id, "expression is empty"));
    }
    Ok(())
}
