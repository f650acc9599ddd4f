//! Dependency graph over build configurations
//!
//! The graph is validated once at configuration-load time and read-only
//! afterwards; no locking is needed to share it between workers.

use std::collections::{HashMap, HashSet};

use crate::core::build::{BuildConfiguration, DependencyEdge};
use crate::core::error::OrchestratorError;

/// Directed acyclic graph of build configurations
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Edges keyed by downstream configuration id
    edges: HashMap<String, Vec<DependencyEdge>>,
}

impl DependencyGraph {
    /// Build the graph and validate acyclicity. Fails fast with
    /// `CycleDetected` naming the cycle.
    pub fn new(configurations: &[BuildConfiguration]) -> Result<Self, OrchestratorError> {
        let edges: HashMap<String, Vec<DependencyEdge>> = configurations
            .iter()
            .map(|c| (c.id.clone(), c.dependencies.clone()))
            .collect();

        let graph = DependencyGraph { edges };
        graph.check_cycles()?;
        Ok(graph)
    }

    /// Upstream edges of a configuration
    pub fn upstreams(&self, id: &str) -> &[DependencyEdge] {
        self.edges.get(id).map(|e| e.as_slice()).unwrap_or(&[])
    }

    /// Topological execution order for a target configuration: the target's
    /// transitive upstream closure, upstream-first, ending with the target.
    pub fn order_for(&self, target: &str) -> Result<Vec<String>, OrchestratorError> {
        if !self.edges.contains_key(target) {
            return Err(OrchestratorError::UnknownConfiguration(target.to_string()));
        }

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.visit(target, &mut visited, &mut order);
        Ok(order)
    }

    fn visit(&self, id: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if !visited.insert(id.to_string()) {
            return;
        }
        for edge in self.upstreams(id) {
            self.visit(&edge.upstream, visited, order);
        }
        order.push(id.to_string());
    }

    fn check_cycles(&self) -> Result<(), OrchestratorError> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        // Sort for a deterministic error when several cycles exist
        let mut ids: Vec<&String> = self.edges.keys().collect();
        ids.sort();

        for id in ids {
            if !visited.contains(id.as_str()) {
                self.dfs_check(id, &mut visited, &mut stack)?;
            }
        }
        Ok(())
    }

    fn dfs_check(
        &self,
        id: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> Result<(), OrchestratorError> {
        visited.insert(id.to_string());
        stack.push(id.to_string());

        for edge in self.upstreams(id) {
            if let Some(pos) = stack.iter().position(|s| s == &edge.upstream) {
                // Report the cycle path closed back on itself
                let mut cycle: Vec<String> = stack[pos..].to_vec();
                cycle.push(edge.upstream.clone());
                return Err(OrchestratorError::CycleDetected { cycle });
            }
            if !visited.contains(edge.upstream.as_str()) {
                self.dfs_check(&edge.upstream, visited, stack)?;
            }
        }

        stack.pop();
        Ok(())
    }
}
