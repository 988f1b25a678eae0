//! Dependency graph of service controllers

use crate::controller::ServiceController;
use crate::{Result, Service};
use directed_graph::DirectedGraph;
use std::sync::Arc;
use tracing::debug;

/// Controllers keyed by service id, with an edge from every dependency to
/// each of its dependents
#[derive(Debug, Default)]
pub(crate) struct ServiceGraph {
    graph: DirectedGraph<Arc<ServiceController>>,
}

impl ServiceGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Controller for `service`, created on first reference
    pub(crate) fn add_service(&mut self, service: &Arc<dyn Service>) -> Arc<ServiceController> {
        let controller = self.controller_for(service);
        self.graph.add_node(Arc::clone(&controller));
        controller
    }

    /// Make `service` depend on `dependency`
    ///
    /// Nothing is recorded when the edge would close a cycle: neither the
    /// edge, nor unknown controllers, nor the pending dependency.
    pub(crate) fn add_dependency(
        &mut self,
        service: &Arc<dyn Service>,
        dependency: &Arc<dyn Service>,
    ) -> Result<()> {
        let dependent = self.controller_for(service);
        let dependency = self.controller_for(dependency);

        debug!("{} depends on {}", dependent.id(), dependency.id());
        self.graph
            .add_edge(Arc::clone(&dependency), Arc::clone(&dependent))?;
        dependent.add_dependency(&dependency);
        Ok(())
    }

    pub(crate) fn service(&self, id: &str) -> Option<&Arc<ServiceController>> {
        self.graph.node(id)
    }

    /// Every controller, in registration order
    pub(crate) fn services(&self) -> impl Iterator<Item = &Arc<ServiceController>> {
        self.graph.nodes()
    }

    pub(crate) fn len(&self) -> usize {
        self.graph.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Services with no dependencies
    pub(crate) fn bootstrap_services(&self) -> Vec<Arc<ServiceController>> {
        self.graph.roots().cloned().collect()
    }

    /// Every service, dependents before their dependencies
    pub(crate) fn teardown_services(&self) -> Result<Vec<Arc<ServiceController>>> {
        Ok(self
            .graph
            .reverse_topological_sort()?
            .into_iter()
            .cloned()
            .collect())
    }

    fn controller_for(&self, service: &Arc<dyn Service>) -> Arc<ServiceController> {
        self.graph
            .node(service.id())
            .cloned()
            .unwrap_or_else(|| ServiceController::new(Arc::clone(service)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, RuntimeContext};
    use async_trait::async_trait;
    use serde_json::Value;

    struct Named(&'static str);

    #[async_trait]
    impl Service for Named {
        fn id(&self) -> &str {
            self.0
        }

        async fn start(&self, _ctx: &RuntimeContext) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }

        async fn stop(&self, _ctx: &RuntimeContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn service(id: &'static str) -> Arc<dyn Service> {
        Arc::new(Named(id))
    }

    fn ids(controllers: &[Arc<ServiceController>]) -> Vec<&str> {
        controllers.iter().map(|c| c.id()).collect()
    }

    #[test]
    fn test_controllers_are_deduplicated_by_id() {
        let mut graph = ServiceGraph::new();
        let first = graph.add_service(&service("a"));
        let second = graph.add_service(&service("a"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_dependency_creates_missing_controllers() {
        let mut graph = ServiceGraph::new();
        let (a, b) = (service("a"), service("b"));
        graph.add_dependency(&b, &a).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(ids(&graph.bootstrap_services()), vec!["a"]);
        assert_eq!(ids(&graph.teardown_services().unwrap()), vec!["b", "a"]);
    }

    #[test]
    fn test_cycle_leaves_no_partial_state() {
        let mut graph = ServiceGraph::new();
        let (a, b, c) = (service("a"), service("b"), service("c"));
        graph.add_dependency(&b, &a).unwrap();
        graph.add_dependency(&c, &b).unwrap();

        let err = graph.add_dependency(&a, &c).unwrap_err();
        assert!(matches!(err, Error::Cycle(_)));

        let a_ctl = graph.service("a").unwrap();
        a_ctl.prepare();
        assert!(a_ctl.pending_dependencies().is_empty());
        assert_eq!(ids(&graph.bootstrap_services()), vec!["a"]);

        let err = graph.add_dependency(&service("d"), &service("d")).unwrap_err();
        assert!(matches!(err, Error::Cycle(_)));
        assert!(graph.service("d").is_none());
    }

    #[test]
    fn test_teardown_puts_dependents_first() {
        let mut graph = ServiceGraph::new();
        let (s1, s2, s3, s4, s5) = (
            service("s1"),
            service("s2"),
            service("s3"),
            service("s4"),
            service("s5"),
        );
        for dependency in [&s1, &s3, &s4] {
            graph.add_dependency(&s2, dependency).unwrap();
        }
        graph.add_dependency(&s4, &s3).unwrap();
        graph.add_service(&s5);

        let bootstrap = graph.bootstrap_services();
        let mut roots = ids(&bootstrap);
        roots.sort();
        assert_eq!(roots, vec!["s1", "s3", "s5"]);

        let order = graph.teardown_services().unwrap();
        let position = |id: &str| order.iter().position(|c| c.id() == id).unwrap();
        assert_eq!(order.len(), 5);
        assert!(position("s2") < position("s1"));
        assert!(position("s2") < position("s4"));
        assert!(position("s4") < position("s3"));
    }
}
