//! Generic directed acyclic graph keyed by string IDs.
//!
//! Acyclicity is enforced on every edge insertion: an edge that would close a
//! cycle is rejected and the graph is left unchanged.

use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use crate::error::GraphError;

/// A value stored in a [`Dag`].
pub trait Vertex: Clone + PartialEq {
    /// Unique key of the vertex.
    fn key(&self) -> String;
}

/// Directed acyclic graph of vertices identified by [`Vertex::key`].
#[derive(Debug, Clone)]
pub struct Dag<V> {
    graph: StableDiGraph<V, ()>,
    index: HashMap<String, NodeIndex>,
}

impl<V> Default for Dag<V> {
    fn default() -> Self {
        Self {
            graph: StableDiGraph::default(),
            index: HashMap::new(),
        }
    }
}

impl<V: Vertex> Dag<V> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns true if the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns true if a vertex with this key exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Inserts a vertex.
    ///
    /// Re-inserting an equal vertex is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ConflictingVertex` if a different vertex with the
    /// same key exists.
    pub fn add_vertex(&mut self, vertex: V) -> Result<(), GraphError> {
        let id = vertex.key();
        if let Some(&existing) = self.index.get(&id) {
            return if self.graph[existing] == vertex {
                Ok(())
            } else {
                Err(GraphError::ConflictingVertex { id })
            };
        }

        let node = self.graph.add_node(vertex);
        self.index.insert(id, node);
        Ok(())
    }

    /// Inserts the edge `from -> to`. Existing edges are left as is.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::VertexNotFound` for unknown keys and
    /// `GraphError::Cycle` for self-loops and edges closing a cycle.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let a = self.node(from)?;
        let b = self.node(to)?;

        if self.graph.contains_edge(a, b) {
            return Ok(());
        }
        if a == b || has_path_connecting(&self.graph, b, a, None) {
            return Err(GraphError::Cycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        self.graph.add_edge(a, b, ());
        Ok(())
    }

    /// Removes the edge `from -> to`. Returns true if it existed.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        let (Some(&a), Some(&b)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        self.graph
            .find_edge(a, b)
            .and_then(|e| self.graph.remove_edge(e))
            .is_some()
    }

    /// Returns true if the edge `from -> to` exists.
    #[must_use]
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Returns the vertex with this key.
    #[must_use]
    pub fn vertex(&self, id: &str) -> Option<&V> {
        self.index.get(id).map(|&n| &self.graph[n])
    }

    /// Returns the vertex with this key, mutably.
    ///
    /// Callers must not change the vertex key.
    pub fn vertex_mut(&mut self, id: &str) -> Option<&mut V> {
        let node = *self.index.get(id)?;
        self.graph.node_weight_mut(node)
    }

    /// All vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &V> {
        self.graph.node_indices().map(|n| &self.graph[n])
    }

    /// All edges as `(from, to)` key pairs, sorted.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].key(), self.graph[b].key()))
            .collect();
        edges.sort();
        edges
    }

    /// Keys of the direct predecessors of a vertex.
    #[must_use]
    pub fn predecessors(&self, id: &str) -> Vec<String> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Keys of the direct successors of a vertex.
    #[must_use]
    pub fn successors(&self, id: &str) -> Vec<String> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Map of every vertex key to the keys of its direct predecessors.
    #[must_use]
    pub fn predecessor_map(&self) -> HashMap<String, HashSet<String>> {
        self.neighbor_map(Direction::Incoming)
    }

    /// Map of every vertex key to the keys of its direct successors.
    #[must_use]
    pub fn adjacency_map(&self) -> HashMap<String, HashSet<String>> {
        self.neighbor_map(Direction::Outgoing)
    }

    /// Removes a vertex and its edges.
    pub fn remove_vertex(&mut self, id: &str) -> Option<V> {
        let node = self.index.remove(id)?;
        self.graph.remove_node(node)
    }

    /// Returns true if `to` is reachable from `from` (a vertex reaches itself).
    #[must_use]
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => has_path_connecting(&self.graph, a, b, None),
            _ => false,
        }
    }

    /// Removes every edge `u -> v` for which another path from `u` to `v`
    /// exists. Reachability is unchanged. Returns the number of removed edges.
    pub fn transitive_reduction(&mut self) -> usize {
        let mut redundant = Vec::new();

        for edge in self.graph.edge_indices() {
            let Some((u, v)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let bypassed = self
                .graph
                .neighbors_directed(u, Direction::Outgoing)
                .filter(|&w| w != v)
                .any(|w| has_path_connecting(&self.graph, w, v, None));
            if bypassed {
                redundant.push(edge);
            }
        }

        for edge in &redundant {
            self.graph.remove_edge(*edge);
        }
        redundant.len()
    }

    fn node(&self, id: &str) -> Result<NodeIndex, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::VertexNotFound { id: id.to_string() })
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n].key())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    fn neighbor_map(&self, direction: Direction) -> HashMap<String, HashSet<String>> {
        self.graph
            .node_indices()
            .map(|n| {
                let neighbors = self
                    .graph
                    .neighbors_directed(n, direction)
                    .map(|m| self.graph[m].key())
                    .collect();
                (self.graph[n].key(), neighbors)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Node(&'static str, u32);

    impl Vertex for Node {
        fn key(&self) -> String {
            self.0.to_string()
        }
    }

    fn dag(vertices: &[&'static str], edges: &[(&str, &str)]) -> Dag<Node> {
        let mut dag = Dag::new();
        for v in vertices {
            dag.add_vertex(Node(v, 0)).expect("vertex");
        }
        for (a, b) in edges {
            dag.add_edge(a, b).expect("edge");
        }
        dag
    }

    #[test]
    fn test_add_vertex_idempotent_and_conflicting() {
        let mut dag = Dag::new();
        dag.add_vertex(Node("a", 1)).expect("first insert");
        dag.add_vertex(Node("a", 1)).expect("equal re-insert");
        assert_eq!(dag.len(), 1);

        assert_eq!(
            dag.add_vertex(Node("a", 2)),
            Err(GraphError::ConflictingVertex { id: String::from("a") })
        );
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let mut dag = dag(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);

        assert!(matches!(dag.add_edge("c", "a"), Err(GraphError::Cycle { .. })));
        assert!(matches!(dag.add_edge("a", "a"), Err(GraphError::Cycle { .. })));
        assert_eq!(dag.edge_count(), 2);
        assert!(!dag.has_edge("c", "a"));
    }

    #[test]
    fn test_add_edge_idempotent_and_unknown_vertex() {
        let mut dag = dag(&["a", "b"], &[("a", "b")]);
        dag.add_edge("a", "b").expect("existing edge");
        assert_eq!(dag.edge_count(), 1);

        assert_eq!(
            dag.add_edge("a", "missing"),
            Err(GraphError::VertexNotFound { id: String::from("missing") })
        );
    }

    #[test]
    fn test_maps_and_neighbors() {
        let dag = dag(&["a", "b", "c"], &[("a", "b"), ("a", "c"), ("b", "c")]);

        assert_eq!(dag.successors("a"), vec!["b", "c"]);
        assert_eq!(dag.predecessors("c"), vec!["a", "b"]);

        let preds = dag.predecessor_map();
        assert!(preds["a"].is_empty());
        assert_eq!(preds["c"].len(), 2);
        assert_eq!(dag.adjacency_map()["b"], HashSet::from([String::from("c")]));
    }

    #[test]
    fn test_transitive_reduction_keeps_reachability() {
        let mut dag = dag(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("a", "c"), ("c", "d"), ("a", "d")],
        );

        assert_eq!(dag.transitive_reduction(), 2);
        assert_eq!(
            dag.edges(),
            vec![
                (String::from("a"), String::from("b")),
                (String::from("b"), String::from("c")),
                (String::from("c"), String::from("d")),
            ]
        );
        assert!(dag.has_path("a", "d"));
        assert_eq!(dag.transitive_reduction(), 0);
    }

    #[test]
    fn test_remove_vertex_drops_edges() {
        let mut dag = dag(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);

        assert_eq!(dag.remove_vertex("b"), Some(Node("b", 0)));
        assert_eq!(dag.edge_count(), 0);
        assert!(!dag.contains("b"));
        assert!(dag.remove_vertex("b").is_none());
    }

    const NAMES: [&str; 5] = ["a", "b", "c", "d", "e"];

    /// Every forward edge between `NAMES`, in index order.
    fn forward_edges() -> Vec<(&'static str, &'static str)> {
        let mut edges = Vec::new();
        for (i, a) in NAMES.iter().enumerate() {
            for b in &NAMES[i + 1..] {
                edges.push((*a, *b));
            }
        }
        edges
    }

    /// All graphs over `NAMES` whose edges respect index order.
    fn all_small_dags() -> impl Iterator<Item = Dag<Node>> {
        let candidates = forward_edges();
        (0u32..1 << candidates.len()).map(move |mask| {
            let edges: Vec<_> = candidates
                .iter()
                .enumerate()
                .filter(|(bit, _)| mask & (1 << bit) != 0)
                .map(|(_, edge)| *edge)
                .collect();
            dag(&NAMES, &edges)
        })
    }

    fn reachable_pairs(dag: &Dag<Node>) -> Vec<(&'static str, &'static str)> {
        let mut pairs = Vec::new();
        for a in NAMES {
            for b in NAMES {
                if a != b && dag.has_path(a, b) {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }

    #[test]
    fn test_transitive_reduction_on_every_small_dag() {
        for original in all_small_dags() {
            let mut reduced = original.clone();
            let removed = reduced.transitive_reduction();

            assert_eq!(reachable_pairs(&reduced), reachable_pairs(&original));
            assert_eq!(reduced.edge_count() + removed, original.edge_count());
            assert_eq!(reduced.transitive_reduction(), 0);

            for (from, to) in reduced.edges() {
                let mut without = reduced.clone();
                assert!(without.remove_edge(&from, &to));
                assert!(!without.has_path(&from, &to), "{from} -> {to} survived with a bypass");
            }
        }
    }

    #[test]
    fn test_rejected_edges_leave_every_small_dag_unchanged() {
        for mut dag in all_small_dags() {
            let edges = dag.edges();
            for (from, to) in reachable_pairs(&dag) {
                assert!(matches!(dag.add_edge(to, from), Err(GraphError::Cycle { .. })));
                assert_eq!(dag.edges(), edges);
            }
        }
    }
}
