//! Dependency graph over RefIDs
//!
//! Nodes are stored densely by declaration index. Both edge directions are
//! kept: `dependencies` (what a node reads) for scheduling, `dependents`
//! (who reads a node) for impact analysis.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::expr::{ExprError, ExprResult, QueryNode};

/// Validated, acyclicity-unchecked dependency graph
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// Edges node -> what it reads, in declaration order
    dependencies: Vec<Vec<usize>>,
    /// Edges node -> who reads it, in declaration order
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph from validated nodes
    pub fn build(nodes: &[QueryNode]) -> ExprResult<Self> {
        Self::from_references(
            nodes
                .iter()
                .map(|node| (node.ref_id.as_str(), node.references())),
        )
    }

    /// Build the graph from `(ref_id, references)` pairs in declaration order
    ///
    /// Fails on a duplicate RefID, a self reference, or a reference to an
    /// id that is not declared.
    pub fn from_references<'a, I>(entries: I) -> ExprResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a BTreeSet<String>)>,
    {
        let entries: Vec<_> = entries.into_iter().collect();
        let mut graph = Self::default();

        for (ref_id, _) in &entries {
            if graph.index.contains_key(*ref_id) {
                return Err(ExprError::DuplicateRefId(ref_id.to_string()));
            }
            graph.index.insert(ref_id.to_string(), graph.ids.len());
            graph.ids.push(ref_id.to_string());
        }

        graph.dependencies = vec![Vec::new(); graph.ids.len()];
        graph.dependents = vec![Vec::new(); graph.ids.len()];

        for (node, (ref_id, references)) in entries.iter().enumerate() {
            for reference in references.iter() {
                if reference == ref_id {
                    return Err(ExprError::SelfReference(ref_id.to_string()));
                }
                let dep = graph.index.get(reference).copied().ok_or_else(|| {
                    ExprError::UnresolvedReference {
                        missing: reference.clone(),
                        referenced_by: ref_id.to_string(),
                    }
                })?;
                graph.dependencies[node].push(dep);
                graph.dependents[dep].push(node);
            }
        }

        for edges in &mut graph.dependencies {
            edges.sort_unstable();
        }

        tracing::debug!(
            nodes = graph.ids.len(),
            edges = graph.dependencies.iter().map(Vec::len).sum::<usize>(),
            "Dependency graph built"
        );
        Ok(graph)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// RefIDs in declaration order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Whether a RefID is declared
    pub fn contains(&self, ref_id: &str) -> bool {
        self.index.contains_key(ref_id)
    }

    /// Declaration index of a RefID
    pub fn index_of(&self, ref_id: &str) -> Option<usize> {
        self.index.get(ref_id).copied()
    }

    /// RefID at a declaration index
    pub(crate) fn id_at(&self, index: usize) -> &str {
        &self.ids[index]
    }

    pub(crate) fn dependency_indices(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Direct dependencies of a node (nodes it reads)
    pub fn dependencies_of(&self, ref_id: &str) -> Vec<&str> {
        self.neighbours(ref_id, &self.dependencies)
    }

    /// Direct dependents of a node (nodes that read it)
    pub fn dependents_of(&self, ref_id: &str) -> Vec<&str> {
        self.neighbours(ref_id, &self.dependents)
    }

    fn neighbours<'a>(&'a self, ref_id: &str, edges: &'a [Vec<usize>]) -> Vec<&'a str> {
        match self.index_of(ref_id) {
            Some(i) => edges[i].iter().map(|&j| self.id_at(j)).collect(),
            None => Vec::new(),
        }
    }

    /// Every node that transitively reads any of `start`, excluding `start` itself
    pub fn downstream_of(&self, start: &[&str]) -> BTreeSet<String> {
        self.reachable(start, &self.dependents)
    }

    /// Every node that any of `start` transitively reads, excluding `start` itself
    pub fn upstream_of(&self, start: &[&str]) -> BTreeSet<String> {
        self.reachable(start, &self.dependencies)
    }

    fn reachable(&self, start: &[&str], edges: &[Vec<usize>]) -> BTreeSet<String> {
        let starts: Vec<usize> = start.iter().filter_map(|id| self.index_of(id)).collect();
        let mut visited = vec![false; self.len()];
        let mut queue: VecDeque<usize> = starts
            .iter()
            .flat_map(|&i| edges[i].iter().copied())
            .collect();

        while let Some(node) = queue.pop_front() {
            if !visited[node] {
                visited[node] = true;
                queue.extend(edges[node].iter().copied());
            }
        }

        visited
            .iter()
            .enumerate()
            .filter(|(i, seen)| **seen && !starts.contains(i))
            .map(|(i, _)| self.ids[i].clone())
            .collect()
    }
}
