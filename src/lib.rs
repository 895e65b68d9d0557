//! # alertexpr
//!
//! Server-side expression engine for alert rules. A rule is a set of named
//! nodes: base queries whose frames are fetched elsewhere, and expressions
//! (math, reduce, resample, threshold, classic conditions) that refer to
//! other nodes by RefID. The engine orders them into a dependency graph,
//! evaluates them, and reports which conditions are firing.
//!
//! ## Modules
//!
//! - [`frame`]: the data model exchanged between nodes
//! - [`expr`]: node definitions, math parser, errors
//! - [`reducer`]: reducer registry and reduce modes
//! - [`graph`]: dependency graph and scheduling
//! - [`eval`]: per-node evaluators and run state
//! - [`executor`]: drives a whole evaluation run
//! - [`config`]: TOML configuration and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use alertexpr::{EvaluationRequest, Executor, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = EvaluationRequest::from_json(r#"{
//!         "queries": [
//!             {"refId": "A", "queryType": "prometheus"},
//!             {"refId": "B", "queryType": "reduce", "expression": "$A", "reducer": "mean"},
//!             {"refId": "C", "queryType": "threshold", "expression": "$B",
//!              "conditions": [{"evaluator": {"type": "gt", "params": [80]}}]}
//!         ],
//!         "frames": {
//!             "A": {"time": [0, 10000], "fields": [
//!                 {"name": "cpu", "data": {"type": "number", "values": [75, 95]}}
//!             ]}
//!         }
//!     }"#)?;
//!
//!     let results = Executor::new(EngineConfig::default()).execute(request).await?;
//!     println!("firing: {:?}", results.firing);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod eval;
pub mod executor;
pub mod expr;
pub mod frame;
pub mod graph;
pub mod reducer;

pub use config::{Config, EngineConfig, LoggingConfig};
pub use eval::{evaluate_node, firing_state, CancelToken, EvaluationContext, Inputs};
pub use executor::{EvaluationRequest, EvaluationResults, Executor, FailurePolicy, Plan, RunFailure};
pub use expr::{ErrorKind, ExprError, ExprResult, QueryNode, RawQueryNode};
pub use frame::{Field, FieldData, Frame, Labels};
pub use graph::{DependencyGraph, Schedule};
pub use reducer::{ReducerId, ReducerRegistry};
