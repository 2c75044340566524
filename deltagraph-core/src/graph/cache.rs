use crate::error::StructuralError;
use crate::id::NodeId;
use crate::result::LayerResult;
use std::collections::HashMap;

#[derive(Debug)]
enum Slot {
    Computing,
    Cached(LayerResult),
}

/// Per-pass memo of node results.
///
/// A node absent from the cache is uncomputed. Each node is computed at most
/// once per pass; re-entering a node that is still computing means the graph
/// has a cycle. The cache, and every result in it, is dropped with the pass.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    slots: HashMap<NodeId, Slot>,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a precomputed result, e.g. an input node's value.
    pub fn seed(&mut self, node: NodeId, result: LayerResult) {
        self.slots.insert(node, Slot::Cached(result));
    }

    pub fn get(&self, node: NodeId) -> Option<&LayerResult> {
        match self.slots.get(&node) {
            Some(Slot::Cached(result)) => Some(result),
            _ => None,
        }
    }

    /// Marks `node` as computing.
    pub fn begin(&mut self, node: NodeId) -> Result<(), StructuralError> {
        match self.slots.get(&node) {
            Some(Slot::Computing) => Err(StructuralError::Cycle(node)),
            _ => {
                self.slots.insert(node, Slot::Computing);
                Ok(())
            }
        }
    }

    pub fn finish(&mut self, node: NodeId, result: LayerResult) {
        self.slots.insert(node, Slot::Cached(result));
    }

    /// Returns a node that failed while computing to the uncomputed state.
    pub fn abandon(&mut self, node: NodeId) {
        if let Some(Slot::Computing) = self.slots.get(&node) {
            self.slots.remove(&node);
        }
    }

    /// Number of nodes with a cached result.
    pub fn cached(&self) -> usize {
        self.slots.values().filter(|s| matches!(s, Slot::Cached(_))).count()
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
