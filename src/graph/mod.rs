//! Dependency graph and scheduling
//!
//! - **Graph**: RefID nodes, "reads" edges in both directions, impact analysis
//! - **Scheduler**: topological order, cycle detection, parallel levels

mod dag;
mod scheduler;

pub use dag::DependencyGraph;
pub use scheduler::{schedule, Schedule};
