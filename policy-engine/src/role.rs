use crate::{
    models::{FieldFilter, Tuple},
    section::PolicySection,
};
use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use std::collections::VecDeque;
use tracing::debug;

/// Default bound on the number of membership hops followed during resolution
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Directed "member of" graph over string-labelled nodes.
///
/// Edges are kept twice: once as an ordered arity-2 section so the CRUD and
/// filter vocabulary matches [`crate::store::PolicyStore`], and once as
/// adjacency lists in both directions for traversal.
#[derive(Debug, Clone)]
pub struct RoleGraph {
    links: PolicySection,
    roles: AHashMap<String, Vec<String>>,
    members: AHashMap<String, Vec<String>>,
}

impl Default for RoleGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleGraph {
    pub fn new() -> Self {
        Self {
            links: PolicySection::new(2),
            roles: AHashMap::new(),
            members: AHashMap::new(),
        }
    }

    fn edge(from: &str, to: &str) -> Tuple {
        Tuple::new([from, to])
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn add_link(&mut self, from: &str, to: &str) -> bool {
        let edge = Self::edge(from, to);
        if self.links.contains(&edge) {
            return false;
        }
        self.links.push(edge);
        self.roles.entry(from.to_string()).or_default().push(to.to_string());
        self.members.entry(to.to_string()).or_default().push(from.to_string());
        true
    }

    pub fn remove_link(&mut self, from: &str, to: &str) -> bool {
        if !self.links.remove(&Self::edge(from, to)) {
            return false;
        }
        Self::detach(&mut self.roles, from, to);
        Self::detach(&mut self.members, to, from);
        true
    }

    fn detach(index: &mut AHashMap<String, Vec<String>>, key: &str, value: &str) {
        if let Some(values) = index.get_mut(key) {
            values.retain(|v| v != value);
            if values.is_empty() {
                index.remove(key);
            }
        }
    }

    pub fn remove_filtered(&mut self, filter: &FieldFilter) -> Vec<Tuple> {
        let removed = self.links.remove_matching(filter);
        for edge in &removed {
            if let (Some(from), Some(to)) = (edge.field(0), edge.field(1)) {
                Self::detach(&mut self.roles, from, to);
                Self::detach(&mut self.members, to, from);
            }
        }
        removed
    }

    pub fn links(&self) -> &[Tuple] {
        self.links.rows()
    }

    pub fn filtered_links(&self, filter: &FieldFilter) -> Vec<Tuple> {
        self.links.matching(filter).cloned().collect()
    }

    pub fn has_link(&self, from: &str, to: &str) -> bool {
        self.roles.get(from).is_some_and(|roles| roles.iter().any(|r| r == to))
    }

    /// Direct roles of `name`, in link order
    pub fn roles(&self, name: &str) -> &[String] {
        self.roles.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct members of `role`, in link order
    pub fn members(&self, role: &str) -> &[String] {
        self.members.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every node reachable from `from` in 1..=`max_depth` hops, breadth-first.
    ///
    /// `from` itself is included only when it lies on a cycle.
    pub fn reachable(&self, from: &str, max_depth: usize) -> Vec<String> {
        let mut visited: AHashSet<&str> = AHashSet::new();
        let mut found = Vec::new();
        let mut frontier: VecDeque<(&str, usize)> = VecDeque::from([(from, 0)]);

        while let Some((node, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for next in self.roles(node) {
                if visited.insert(next.as_str()) {
                    found.push(next.clone());
                    frontier.push_back((next.as_str(), depth + 1));
                }
            }
        }
        found
    }

    /// Whether `to` is reachable from `from` in 1..=`max_depth` hops
    pub fn is_reachable(&self, from: &str, to: &str, max_depth: usize) -> bool {
        let mut visited: AHashSet<&str> = AHashSet::new();
        let mut frontier: VecDeque<(&str, usize)> = VecDeque::from([(from, 0)]);

        while let Some((node, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for next in self.roles(node) {
                if next == to {
                    return true;
                }
                if visited.insert(next.as_str()) {
                    frontier.push_back((next.as_str(), depth + 1));
                }
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.roles.clear();
        self.members.clear();
    }
}

/// Independent named role graphs behind one reader-writer lock.
///
/// Every operation is total: unknown graphs and nodes yield empty results or
/// `false`, and mutating an unknown graph creates it.
pub struct RoleManager {
    graphs: RwLock<AHashMap<String, RoleGraph>>,
    max_depth: usize,
}

impl Default for RoleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleManager {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Manager whose traversals follow at most `max_depth` hops
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            graphs: RwLock::new(AHashMap::new()),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn graph_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graphs.read().keys().cloned().collect();
        names.sort();
        names
    }

    // =============================================================================
    // Link Management
    // =============================================================================

    pub fn add_link(&self, graph: &str, from: &str, to: &str) -> bool {
        let added = self
            .graphs
            .write()
            .entry(graph.to_string())
            .or_default()
            .add_link(from, to);
        if added {
            debug!(graph, from, to, "Added role link");
        }
        added
    }

    pub fn remove_link(&self, graph: &str, from: &str, to: &str) -> bool {
        let removed = self
            .graphs
            .write()
            .get_mut(graph)
            .is_some_and(|g| g.remove_link(from, to));
        if removed {
            debug!(graph, from, to, "Removed role link");
        }
        removed
    }

    pub fn remove_filtered_links(&self, graph: &str, filter: &FieldFilter) -> Vec<Tuple> {
        self.graphs
            .write()
            .get_mut(graph)
            .map(|g| g.remove_filtered(filter))
            .unwrap_or_default()
    }

    /// Replace the contents of `graph` with `links`, skipping malformed edges
    pub fn rebuild<'a, I>(&self, graph: &str, links: I)
    where
        I: IntoIterator<Item = &'a Tuple>,
    {
        let mut fresh = RoleGraph::new();
        for link in links {
            if let (Some(from), Some(to), 2) = (link.field(0), link.field(1), link.arity()) {
                fresh.add_link(from, to);
            }
        }
        debug!(graph, links = fresh.len(), "Rebuilt role graph");
        self.graphs.write().insert(graph.to_string(), fresh);
    }

    pub fn clear(&self) {
        self.graphs.write().clear();
    }

    // =============================================================================
    // Queries
    // =============================================================================

    pub fn get_all_links(&self, graph: &str) -> Vec<Tuple> {
        self.graphs
            .read()
            .get(graph)
            .map(|g| g.links().to_vec())
            .unwrap_or_default()
    }

    pub fn get_filtered_links(&self, graph: &str, filter: &FieldFilter) -> Vec<Tuple> {
        self.graphs
            .read()
            .get(graph)
            .map(|g| g.filtered_links(filter))
            .unwrap_or_default()
    }

    /// Whether the direct edge `from -> to` exists
    pub fn has_link(&self, graph: &str, from: &str, to: &str) -> bool {
        self.graphs
            .read()
            .get(graph)
            .is_some_and(|g| g.has_link(from, to))
    }

    pub fn get_roles(&self, graph: &str, name: &str) -> Vec<String> {
        self.graphs
            .read()
            .get(graph)
            .map(|g| g.roles(name).to_vec())
            .unwrap_or_default()
    }

    pub fn get_users(&self, graph: &str, role: &str) -> Vec<String> {
        self.graphs
            .read()
            .get(graph)
            .map(|g| g.members(role).to_vec())
            .unwrap_or_default()
    }

    /// Transitive closure of "member of" starting at `from`
    pub fn get_reachable(&self, graph: &str, from: &str) -> Vec<String> {
        let reachable = self
            .graphs
            .read()
            .get(graph)
            .map(|g| g.reachable(from, self.max_depth))
            .unwrap_or_default();
        debug!(graph, from, count = reachable.len(), "Resolved reachable roles");
        reachable
    }

    pub fn is_reachable(&self, graph: &str, from: &str, to: &str) -> bool {
        self.graphs
            .read()
            .get(graph)
            .is_some_and(|g| g.is_reachable(from, to, self.max_depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_hop_resolution() {
        let manager = RoleManager::new();
        manager.add_link("g", "a", "b");
        manager.add_link("g", "b", "c");

        assert_eq!(manager.get_reachable("g", "a"), vec!["b", "c"]);
        assert!(manager.is_reachable("g", "a", "c"));
        assert!(!manager.has_link("g", "a", "c"));
        assert!(!manager.is_reachable("g", "c", "a"));
    }

    #[test]
    fn test_cycle_terminates() {
        let manager = RoleManager::new();
        manager.add_link("g", "a", "b");
        manager.add_link("g", "b", "c");
        manager.add_link("g", "c", "a");

        assert_eq!(manager.get_reachable("g", "a"), vec!["b", "c", "a"]);
        assert!(manager.is_reachable("g", "a", "a"));
        assert!(!manager.is_reachable("g", "a", "z"));
    }

    #[test]
    fn test_depth_bound() {
        let manager = RoleManager::with_max_depth(2);
        manager.add_link("g", "n0", "n1");
        manager.add_link("g", "n1", "n2");
        manager.add_link("g", "n2", "n3");

        assert_eq!(manager.get_reachable("g", "n0"), vec!["n1", "n2"]);
        assert!(manager.is_reachable("g", "n0", "n2"));
        assert!(!manager.is_reachable("g", "n0", "n3"));
    }

    #[test]
    fn test_graphs_are_independent() {
        let manager = RoleManager::new();
        manager.add_link("g", "alice", "admin");
        manager.add_link("g2", "data1", "data_group");

        assert!(manager.get_reachable("g2", "alice").is_empty());
        assert!(!manager.is_reachable("g", "data1", "data_group"));
        assert_eq!(manager.graph_names(), vec!["g", "g2"]);
    }

    #[test]
    fn test_remove_keeps_indexes_in_step() {
        let mut graph = RoleGraph::new();
        assert!(graph.add_link("alice", "admin"));
        assert!(!graph.add_link("alice", "admin"));
        graph.add_link("bob", "admin");

        assert_eq!(graph.members("admin"), &["alice".to_string(), "bob".to_string()]);
        assert!(graph.remove_link("alice", "admin"));
        assert!(!graph.remove_link("alice", "admin"));
        assert_eq!(graph.members("admin"), &["bob".to_string()]);
        assert!(graph.roles("alice").is_empty());

        let removed = graph.remove_filtered(&FieldFilter::new(1, ["admin"]));
        assert_eq!(removed, vec![Tuple::from(["bob", "admin"])]);
        assert!(graph.is_empty());
        assert!(graph.members("admin").is_empty());
    }
}
