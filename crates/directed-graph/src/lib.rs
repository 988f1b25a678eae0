//! # Directed Graph
//!
//! Identity-keyed directed acyclic graph used to encode "must come before"
//! relations between nodes.
//!
//! Nodes are stored by their [`Identifiable::id`]. An edge `from -> to` means
//! `from` precedes `to`. The graph refuses any edge that would close a cycle,
//! so it stays acyclic after every successful mutation.
//!
//! ## Example
//!
//! ```rust
//! use directed_graph::DirectedGraph;
//!
//! let mut graph = DirectedGraph::new();
//! graph.add_edge("db".to_string(), "api".to_string()).unwrap();
//! graph.add_edge("cache".to_string(), "api".to_string()).unwrap();
//!
//! let order: Vec<&String> = graph.topological_sort().unwrap();
//! assert_eq!(order.last().map(|s| s.as_str()), Some("api"));
//!
//! // api -> db would close the loop
//! assert!(graph.add_edge("api".to_string(), "db".to_string()).is_err());
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod error;
mod graph;

pub use error::{CycleError, GraphError, Result};
pub use graph::DirectedGraph;

/// Anything that can be stored in a [`DirectedGraph`]
pub trait Identifiable {
    /// Stable identity of the node; two nodes with the same id are the same node
    fn id(&self) -> &str;
}

impl Identifiable for String {
    fn id(&self) -> &str {
        self
    }
}

impl Identifiable for &str {
    fn id(&self) -> &str {
        self
    }
}

impl<T: Identifiable + ?Sized> Identifiable for std::sync::Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }
}

impl<T: Identifiable + ?Sized> Identifiable for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }
}
