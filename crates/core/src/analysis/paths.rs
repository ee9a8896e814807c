//! Call-path enumeration.
//!
//! Depth-bounded DFS over simple paths. With `include_cycles` a node may
//! be revisited at most once and no edge is traversed twice, which captures
//! "one loop around" without unbounded enumeration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::analysis::QueryError;
use crate::graph::{CallGraph, NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathQuery {
    pub target: String,
    pub source: Option<String>,
    pub max_depth: usize,
    pub include_cycles: bool,
    /// Paths traversing `@unresolved` are suppressed unless set.
    pub include_unresolved: bool,
}

impl PathQuery {
    pub fn to_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            source: None,
            max_depth: 10,
            include_cycles: false,
            include_unresolved: false,
        }
    }
}

/// Enumerated paths, ordered by (length, lexicographic name tuple).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSet {
    pub target: String,
    pub source: Option<String>,
    pub paths: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathStatistics {
    pub total_paths: usize,
    pub max_depth: usize,
    pub min_depth: usize,
    pub average_depth: f64,
}

impl PathSet {
    pub fn statistics(&self) -> PathStatistics {
        let depths: Vec<usize> = self.paths.iter().map(|p| p.len() - 1).collect();
        PathStatistics {
            total_paths: depths.len(),
            max_depth: depths.iter().copied().max().unwrap_or(0),
            min_depth: depths.iter().copied().min().unwrap_or(0),
            average_depth: if depths.is_empty() {
                0.0
            } else {
                depths.iter().sum::<usize>() as f64 / depths.len() as f64
            },
        }
    }
}

/// Enumerates call paths reaching `query.target`.
///
/// With a source, all simple paths source -> target within the depth bound.
/// Without one, paths from every function that has the target in its
/// transitive callee closure.
pub fn find_paths(graph: &CallGraph, query: &PathQuery) -> Result<PathSet, QueryError> {
    let target = graph
        .node_named(&query.target)
        .ok_or_else(|| QueryError::UnknownFunction(query.target.clone()))?;

    let mut found: BTreeSet<Vec<String>> = BTreeSet::new();

    match &query.source {
        Some(source) => {
            let src = graph
                .node_named(source)
                .ok_or_else(|| QueryError::UnknownFunction(source.clone()))?;
            enumerate_from(graph, src, target, query, &mut found);
        }
        None => {
            for src in graph.ancestors(target) {
                enumerate_from(graph, src, target, query, &mut found);
            }
        }
    }

    let mut paths: Vec<Vec<String>> = found.into_iter().collect();
    paths.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    Ok(PathSet {
        target: query.target.clone(),
        source: query.source.clone(),
        paths,
    })
}

fn enumerate_from(
    graph: &CallGraph,
    source: NodeId,
    target: NodeId,
    query: &PathQuery,
    out: &mut BTreeSet<Vec<String>>,
) {
    if source == target {
        // A query for the target itself yields the single zero-length path.
        out.insert(vec![graph.node(target).name.clone()]);
        return;
    }
    let mut visits = vec![0u8; graph.len()];
    let mut used_edges = vec![false; graph.edge_count()];
    let mut path = vec![source];
    visits[source] = 1;
    dfs(
        graph,
        source,
        target,
        query,
        &mut visits,
        &mut used_edges,
        &mut path,
        out,
    );
}

#[allow(clippy::too_many_arguments)]
fn dfs(
    graph: &CallGraph,
    current: NodeId,
    target: NodeId,
    query: &PathQuery,
    visits: &mut [u8],
    used_edges: &mut [bool],
    path: &mut Vec<NodeId>,
    out: &mut BTreeSet<Vec<String>>,
) {
    if current == target && path.len() > 1 {
        out.insert(path.iter().map(|&v| graph.node(v).name.clone()).collect());
        return;
    }
    if path.len() - 1 >= query.max_depth {
        return;
    }
    let revisit_limit = if query.include_cycles { 2 } else { 1 };
    for (eid, edge) in graph.out_edges(current) {
        let next = edge.to;
        if !query.include_unresolved && graph.node(next).kind == NodeKind::Unresolved {
            continue;
        }
        if visits[next] >= revisit_limit || used_edges[eid] {
            continue;
        }
        visits[next] += 1;
        used_edges[eid] = true;
        path.push(next);
        dfs(graph, next, target, query, visits, used_edges, path, out);
        path.pop();
        used_edges[eid] = false;
        visits[next] -= 1;
    }
}
