//! Graph storage and traversal

use crate::{CycleError, GraphError, Identifiable, Result};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashSet, VecDeque};

/// Adjacency index: node id -> ids on the other end of its edges
type Refs = IndexMap<String, IndexSet<String>>;

/// Directed graph keyed by node identity
///
/// Two adjacency indices are kept per node: `incoming` (who precedes me) and
/// `outgoing` (whom I precede). Both are insertion ordered, which makes every
/// traversal deterministic for a given sequence of mutations.
#[derive(Debug, Clone)]
pub struct DirectedGraph<T> {
    nodes: IndexMap<String, T>,
    incoming: Refs,
    outgoing: Refs,
}

impl<T> Default for DirectedGraph<T> {
    fn default() -> Self {
        Self {
            nodes: IndexMap::new(),
            incoming: IndexMap::new(),
            outgoing: IndexMap::new(),
        }
    }
}

impl<T: Identifiable> DirectedGraph<T> {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node unless one with the same id already exists
    ///
    /// Returns `true` if the node was inserted.
    pub fn add_node(&mut self, node: T) -> bool {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.nodes.insert(id, node);
        true
    }

    /// Record `from -> to`, inserting both nodes if absent
    ///
    /// The edge is checked before anything is written: if `to` can already
    /// reach `from` (or both are the same node) the call fails and the graph is
    /// left untouched.
    pub fn add_edge(&mut self, from: T, to: T) -> std::result::Result<(), CycleError> {
        let from_id = from.id().to_string();
        let to_id = to.id().to_string();

        if from_id == to_id || self.is_reachable(&to_id, &from_id) {
            return Err(CycleError {
                from: from_id,
                to: to_id,
            });
        }

        self.add_node(from);
        self.add_node(to);
        self.outgoing
            .entry(from_id.clone())
            .or_default()
            .insert(to_id.clone());
        self.incoming.entry(to_id).or_default().insert(from_id);

        debug_assert!(self.is_acyclic());
        Ok(())
    }

    /// Kahn's algorithm: repeatedly remove nodes without pending incoming edges
    pub fn is_acyclic(&self) -> bool {
        let mut in_degree: IndexMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| (id.as_str(), 0))
            .collect();
        for targets in self.outgoing.values() {
            for target in targets {
                if let Some(degree) = in_degree.get_mut(target.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut removed = 0;
        while let Some(id) = queue.pop_front() {
            removed += 1;
            for target in self.outgoing.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(target.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(target.as_str());
                    }
                }
            }
        }

        removed == self.nodes.len()
    }

    /// Nodes with no incoming edge
    pub fn roots(&self) -> impl Iterator<Item = &T> {
        self.nodes
            .iter()
            .filter(|(id, _)| Self::has_no_refs(&self.incoming, id))
            .map(|(_, node)| node)
    }

    /// Every node ordered so that each one comes after all of its predecessors
    ///
    /// Depth-first post-order walk that starts from the nodes nothing depends
    /// on and descends through incoming edges.
    pub fn topological_sort(&self) -> Result<Vec<&T>> {
        if !self.is_acyclic() {
            return Err(GraphError::NotAcyclic);
        }

        let sinks = self
            .nodes
            .keys()
            .filter(|id| Self::has_no_refs(&self.outgoing, id))
            .map(String::as_str);

        Ok(self.post_order(&self.incoming, sinks))
    }

    /// Exact reverse of [`topological_sort`](Self::topological_sort):
    /// successors before predecessors
    pub fn reverse_topological_sort(&self) -> Result<Vec<&T>> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&T> {
        self.nodes.get(id)
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.nodes.values()
    }

    /// Whether a node with this id exists
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of the nodes with an edge into `id`
    pub fn predecessors(&self, id: &str) -> impl Iterator<Item = &str> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Ids of the nodes `id` has an edge into
    pub fn successors(&self, id: &str) -> impl Iterator<Item = &str> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    fn has_no_refs(refs: &Refs, id: &str) -> bool {
        refs.get(id).is_none_or(IndexSet::is_empty)
    }

    /// Whether `target` can be reached from `start` by following outgoing edges
    fn is_reachable(&self, start: &str, target: &str) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if seen.insert(id) {
                stack.extend(self.successors(id));
            }
        }
        false
    }

    /// Iterative post-order DFS following `forward` from each start node
    fn post_order<'a>(
        &'a self,
        forward: &'a Refs,
        starts: impl Iterator<Item = &'a str>,
    ) -> Vec<&'a T> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        for start in starts {
            if !visited.insert(start) {
                continue;
            }

            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
            while let Some((id, cursor)) = stack.last_mut() {
                let id: &'a str = *id;
                let next = forward.get(id).and_then(|refs| refs.get_index(*cursor));
                *cursor += 1;

                match next {
                    Some(child) => {
                        if visited.insert(child.as_str()) {
                            stack.push((child.as_str(), 0));
                        }
                    }
                    None => {
                        stack.pop();
                        if let Some(node) = self.nodes.get(id) {
                            order.push(node);
                        }
                    }
                }
            }
        }

        order
    }
}
