//! Dependency resolution over the foreign-key graph
//!
//! Tables are peeled into execution tiers: a table lands in the first tier
//! after every table it references. Tables inside one tier never reference each
//! other and can be processed concurrently.

use crate::catalog::SchemaCatalog;
use crate::error::{CoreError, CoreResult};
use crate::names::TableName;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write;

/// A set of tables that can run concurrently, in lexicographic order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExecutionTier {
    tables: Vec<TableName>,
}

impl ExecutionTier {
    /// Build a tier from tables known not to reference each other
    pub fn new(mut tables: Vec<TableName>) -> Self {
        tables.sort();
        tables.dedup();
        Self { tables }
    }

    /// Tables in this tier
    pub fn tables(&self) -> &[TableName] {
        &self.tables
    }

    /// Whether the tier contains `table`
    pub fn contains(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Directed graph of table references (edge from referencing to referenced table)
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<TableName, ()>,
    node_map: HashMap<TableName, NodeIndex>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table to the graph
    pub fn add_table(&mut self, name: &TableName) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.clone());
        self.node_map.insert(name.clone(), idx);
        idx
    }

    /// Record that `from` references `to`; self-references are dropped
    pub fn add_reference(&mut self, from: &TableName, to: &TableName) {
        let from_idx = self.add_table(from);
        let to_idx = self.add_table(to);
        if from_idx != to_idx && self.graph.find_edge(from_idx, to_idx).is_none() {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    /// Build the graph from a map of table -> referenced tables.
    ///
    /// References to tables that are not keys of the map are outside the
    /// working set and ignored.
    pub fn build(references: &BTreeMap<TableName, BTreeSet<TableName>>) -> Self {
        let mut graph = Self::new();
        for table in references.keys() {
            graph.add_table(table);
        }
        for (table, targets) in references {
            for target in targets {
                if references.contains_key(target) {
                    graph.add_reference(table, target);
                }
            }
        }
        graph
    }

    /// Build the graph for `tables` from their catalog foreign keys
    pub fn from_catalog(catalog: &SchemaCatalog, tables: &BTreeSet<TableName>) -> CoreResult<Self> {
        let mut references = BTreeMap::new();
        for name in tables {
            let spec = catalog.table(name)?;
            references.insert(name.clone(), spec.referenced_tables());
        }
        Ok(Self::build(&references))
    }

    /// Number of tables in the graph
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no tables
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Tables referenced by `table`, sorted
    pub fn references(&self, table: &str) -> Vec<TableName> {
        let Some(&idx) = self.node_map.get(table) else {
            return Vec::new();
        };
        let mut targets: Vec<TableName> = self
            .graph
            .neighbors(idx)
            .map(|n| self.graph[n].clone())
            .collect();
        targets.sort();
        targets
    }

    /// Peel the graph into execution tiers.
    ///
    /// Fails with `CyclicDependency` without returning any tier when the
    /// remaining tables cannot be peeled.
    pub fn tiers(&self) -> CoreResult<Vec<ExecutionTier>> {
        let mut remaining: BTreeSet<NodeIndex> = self.graph.node_indices().collect();
        let mut tiers = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<NodeIndex> = remaining
                .iter()
                .copied()
                .filter(|&idx| {
                    self.graph
                        .neighbors(idx)
                        .all(|target| !remaining.contains(&target))
                })
                .collect();

            if ready.is_empty() {
                let mut unresolved: Vec<String> = remaining
                    .iter()
                    .map(|&idx| self.graph[idx].to_string())
                    .collect();
                unresolved.sort();
                let cycle = self.cycle_members(&remaining);
                return Err(CoreError::CyclicDependency {
                    cycle: if cycle.is_empty() {
                        unresolved.clone()
                    } else {
                        cycle
                    },
                    unresolved,
                });
            }

            for idx in &ready {
                remaining.remove(idx);
            }
            let mut tables: Vec<TableName> =
                ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
            tables.sort();
            tiers.push(ExecutionTier { tables });
        }

        Ok(tiers)
    }

    /// Tables that sit on a cycle among `remaining`.
    ///
    /// Tables that only reference a cycle are unresolved but not members.
    fn cycle_members(&self, remaining: &BTreeSet<NodeIndex>) -> Vec<String> {
        let mut sub: DiGraph<NodeIndex, ()> = DiGraph::new();
        let mut local = HashMap::new();
        for &idx in remaining {
            local.insert(idx, sub.add_node(idx));
        }
        for &idx in remaining {
            for target in self.graph.neighbors(idx) {
                if let (Some(&a), Some(&b)) = (local.get(&idx), local.get(&target)) {
                    sub.add_edge(a, b, ());
                }
            }
        }

        let mut members: Vec<String> = tarjan_scc(&sub)
            .into_iter()
            .filter(|component| component.len() > 1)
            .flatten()
            .map(|n| self.graph[sub[n]].to_string())
            .collect();
        members.sort();
        members
    }
}

/// Compute the execution tiers for `tables`
pub fn resolve(catalog: &SchemaCatalog, tables: &BTreeSet<TableName>) -> CoreResult<Vec<ExecutionTier>> {
    DependencyGraph::from_catalog(catalog, tables)?.tiers()
}

/// Render tiers as a numbered list, one tier per line
pub fn render_tiers(tiers: &[ExecutionTier]) -> String {
    let mut out = String::new();
    for (i, tier) in tiers.iter().enumerate() {
        let names: Vec<&str> = tier.tables().iter().map(|t| t.as_str()).collect();
        let _ = writeln!(out, "Tier {}: {}", i + 1, names.join(", "));
    }
    out
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
