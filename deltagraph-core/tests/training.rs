use deltagraph_core::device::DeviceError;
use deltagraph_core::train::{evaluate, PointSample};
use deltagraph_core::{DeltaGraphError, ExecutionContext, HostBackend, Layer};
use std::sync::Arc;

mod common;
use common::{init_logger, linear_batch, regression_network, sgd_step};

#[test]
fn test_partition_merge_is_order_independent() {
    let ctx = ExecutionContext::host();
    let (net, _) = regression_network(2, 3, 1);
    let batch = linear_batch(9, 2);
    let parts: Vec<PointSample> = batch.chunks(3).map(|c| evaluate(&net, &ctx, c).unwrap()).collect();

    let mut forward = PointSample::empty();
    for p in &parts {
        forward.merge(p).unwrap();
    }
    let mut backward = PointSample::empty();
    for p in parts.iter().rev() {
        backward.merge(p).unwrap();
    }
    let whole = evaluate(&net, &ctx, &batch).unwrap();

    assert_eq!(forward.count(), 9);
    approx::assert_relative_eq!(forward.loss_sum(), backward.loss_sum(), epsilon = 1e-12);
    approx::assert_relative_eq!(forward.loss_sum(), whole.loss_sum(), epsilon = 1e-12);
    for ((k, a), (_, b)) in forward.delta().iter().zip(backward.delta().iter()) {
        let w = whole.delta().get(k.layer, k.slot).unwrap();
        for ((x, y), z) in a.gradient().data().iter().zip(b.gradient().data()).zip(w.data()) {
            approx::assert_relative_eq!(*x, *y, epsilon = 1e-12);
            approx::assert_relative_eq!(*x, *z, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_gradient_descent_reduces_loss() {
    init_logger();
    let ctx = ExecutionContext::host();
    let (net, _) = regression_network(2, 6, 4);
    let batch = linear_batch(32, 8);
    let initial = evaluate(&net, &ctx, &batch).unwrap().mean_loss().unwrap();
    for _ in 0..300 {
        let sample = evaluate(&net, &ctx, &batch).unwrap();
        sgd_step(&sample.normalized(), 0.1);
    }
    let trained = evaluate(&net, &ctx, &batch).unwrap().mean_loss().unwrap();
    assert!(trained < initial * 0.5, "loss went from {} to {}", initial, trained);
}

#[test]
fn test_device_failure_leaves_no_trace() {
    init_logger();
    let backend = Arc::new(HostBackend::new(1));
    let ctx = ExecutionContext::builder().backend(backend.clone()).build().unwrap();
    let (net, _) = regression_network(2, 3, 6);
    let batch = linear_batch(4, 1);
    let before: Vec<_> = net.state().iter().map(|p| p.snapshot()).collect();

    backend.fail_next_launch();
    match evaluate(&net, &ctx, &batch).unwrap_err() {
        DeltaGraphError::Component { source, .. } => assert!(matches!(source, DeviceError::Kernel { .. })),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(backend.total_live_allocations(), 0);
    let after: Vec<_> = net.state().iter().map(|p| p.snapshot()).collect();
    assert_eq!(before, after);

    // The network is still usable.
    assert_eq!(evaluate(&net, &ctx, &batch).unwrap().count(), 4);
    assert_eq!(backend.total_live_allocations(), 0);
}

#[test]
fn test_frozen_network_keeps_parameters() {
    let ctx = ExecutionContext::host();
    let (net, _) = regression_network(2, 3, 6);
    net.freeze();
    let sample = evaluate(&net, &ctx, &linear_batch(4, 1)).unwrap();
    assert!(sample.delta().is_empty());
    assert!(sample.loss_sum() > 0.0);
}
