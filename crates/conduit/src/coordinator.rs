//! Coordinator (spec §4.E): a pure registry of named nodes, each grouping
//! one or more sources. Strategies resolve sources by `(nodeName,
//! optional sourceIndex)` rather than holding references of their own, so
//! rewiring a node's membership doesn't require touching every strategy
//! that addresses it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::source::FullSource;

pub struct Node {
    pub sources: Vec<Arc<dyn FullSource>>,
}

impl Node {
    pub fn new(sources: Vec<Arc<dyn FullSource>>) -> Self {
        Self { sources }
    }
}

#[derive(Default)]
pub struct Coordinator {
    nodes: HashMap<String, Node>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, name: impl Into<String>, node: Node) -> Self {
        self.nodes.insert(name.into(), node);
        self
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn sources(&self, name: &str) -> &[Arc<dyn FullSource>] {
        self.nodes.get(name).map(|n| n.sources.as_slice()).unwrap_or(&[])
    }

    pub fn source(&self, name: &str, index: usize) -> Option<&Arc<dyn FullSource>> {
        self.nodes.get(name)?.sources.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NullSource;

    #[test]
    fn resolves_sources_by_node_name() {
        let coordinator = Coordinator::new()
            .with_node("store", Node::new(vec![Arc::new(NullSource::default())]));
        assert_eq!(coordinator.sources("store").len(), 1);
        assert!(coordinator.sources("missing").is_empty());
    }
}
