//! Expressions
//!
//! Everything about a node before it is evaluated:
//!
//! - **Nodes**: wire format and validated `QueryNode`s
//! - **References**: `$A` / `${name}` extraction
//! - **Math**: expression AST and parser
//! - **Conditions**: threshold and classic condition types
//! - **Durations**: resample window strings
//!
//! # Example
//!
//! ```rust
//! use alertexpr::expr::QueryNode;
//!
//! let node = QueryNode::from_json(
//!     r#"{"refId": "C", "queryType": "math", "expression": "($A - $B) * 100 / $B"}"#,
//! )
//! .unwrap();
//!
//! assert_eq!(node.references().len(), 2);
//! ```

mod ast;
mod condition;
mod duration;
mod error;
mod node;
mod parser;
mod refs;

pub use ast::{BinaryOp, MathExpr};
pub use condition::{
    combine_conditions, ClassicCondition, ClassicConditionJson, ClassicPredicate, Combine,
    ConditionQueryJson, ConditionReducerJson, EvaluatorJson, OperatorJson, ThresholdCondition,
    ThresholdConditionJson, ThresholdPredicate,
};
pub use duration::parse_duration;
pub use error::{ErrorKind, ExprError, ExprResult};
pub use node::{
    ClassicQuery, MathQuery, NodeKind, QueryNode, RawQueryNode, ReduceQuery, ResampleQuery,
    ThresholdQuery,
};
pub use parser::parse_math;
pub use refs::{parse_references, single_reference};
