use super::*;
use crate::tensor::{Tensor, TensorList};

fn result() -> LayerResult {
    LayerResult::constant(TensorList::single(Tensor::scalar(1.0)))
}

#[test]
fn test_reentering_computing_node_is_a_cycle() {
    let mut cache = EvaluationCache::new();
    cache.begin(NodeId(1)).unwrap();
    assert_eq!(cache.begin(NodeId(1)), Err(StructuralError::Cycle(NodeId(1))));
    assert!(cache.get(NodeId(1)).is_none());
}

#[test]
fn test_finish_caches_result() {
    let mut cache = EvaluationCache::new();
    let r = result();
    cache.begin(NodeId(2)).unwrap();
    cache.finish(NodeId(2), r.clone());
    assert!(cache.get(NodeId(2)).unwrap().ptr_eq(&r));
    assert_eq!(cache.cached(), 1);
}

#[test]
fn test_abandon_only_clears_computing() {
    let mut cache = EvaluationCache::new();
    cache.seed(NodeId(1), result());
    cache.abandon(NodeId(1));
    assert!(cache.get(NodeId(1)).is_some());
    cache.begin(NodeId(2)).unwrap();
    cache.abandon(NodeId(2));
    assert!(cache.begin(NodeId(2)).is_ok());
}
