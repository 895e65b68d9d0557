//! Evaluation scheduling
//!
//! Depth-first topological sort with cycle detection. Dependencies are
//! visited before their consumers, roots and edges in declaration order, so
//! the resulting order is deterministic.

use serde::Serialize;

use super::dag::DependencyGraph;
use crate::expr::{ExprError, ExprResult};

/// Evaluation plan for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// Every node after all of its dependencies
    order: Vec<String>,
    /// Waves of mutually independent nodes; wave `n` only reads waves `< n`
    levels: Vec<Vec<String>>,
}

impl Schedule {
    /// Topological order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Parallel-eligible waves, each in declaration order
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Number of scheduled nodes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Position of a node in the topological order
    pub fn position(&self, ref_id: &str) -> Option<usize> {
        self.order.iter().position(|id| id == ref_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    None,
    Visiting,
    Visited,
}

/// Order the graph for evaluation
///
/// Fails with `CycleDetected` listing the cycle in traversal order, closed
/// by repeating its first node (`A -> B -> A`).
pub fn schedule(graph: &DependencyGraph) -> ExprResult<Schedule> {
    let count = graph.len();
    let mut state = vec![VisitState::None; count];
    let mut stack = Vec::new();
    let mut order = Vec::with_capacity(count);

    for i in 0..count {
        if state[i] == VisitState::None {
            visit(i, graph, &mut state, &mut stack, &mut order)?;
        }
    }

    // Longest dependency chain below each node
    let mut depth = vec![0usize; count];
    for &node in &order {
        depth[node] = graph
            .dependency_indices(node)
            .iter()
            .map(|&dep| depth[dep] + 1)
            .max()
            .unwrap_or(0);
    }

    let wave_count = depth.iter().max().map_or(0, |d| d + 1);
    let mut levels = vec![Vec::new(); wave_count];
    for (node, &d) in depth.iter().enumerate() {
        levels[d].push(graph.id_at(node).to_string());
    }

    Ok(Schedule {
        order: order.into_iter().map(|i| graph.id_at(i).to_string()).collect(),
        levels,
    })
}

/// Depth-first post-order walk from `root`
///
/// Iterative so chain length is bounded by memory, not by the thread stack.
/// `stack` holds `(node, next dependency index)` frames.
fn visit(
    root: usize,
    graph: &DependencyGraph,
    state: &mut [VisitState],
    stack: &mut Vec<(usize, usize)>,
    order: &mut Vec<usize>,
) -> ExprResult<()> {
    state[root] = VisitState::Visiting;
    stack.push((root, 0));

    while let Some(frame) = stack.last_mut() {
        let (node, next) = *frame;
        let Some(&dep) = graph.dependency_indices(node).get(next) else {
            stack.pop();
            state[node] = VisitState::Visited;
            order.push(node);
            continue;
        };
        frame.1 += 1;

        match state[dep] {
            VisitState::Visited => {}
            VisitState::Visiting => {
                let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..]
                    .iter()
                    .map(|&(n, _)| graph.id_at(n).to_string())
                    .collect();
                cycle.push(graph.id_at(dep).to_string());
                tracing::debug!(cycle = ?cycle, "Cycle detected");
                return Err(ExprError::CycleDetected(cycle));
            }
            VisitState::None => {
                state[dep] = VisitState::Visiting;
                stack.push((dep, 0));
            }
        }
    }

    Ok(())
}

impl DependencyGraph {
    /// Order this graph for evaluation
    pub fn schedule(&self) -> ExprResult<Schedule> {
        schedule(self)
    }
}
