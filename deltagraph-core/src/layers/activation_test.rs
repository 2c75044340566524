use super::*;
use crate::context::Precision;
use crate::device::HostBackend;
use crate::grad_check::{check_layer_gradients, probe_id, GradCheckConfig};
use crate::tensor::Tensor;
use crate::test_utils::init_logger;
use approx::assert_relative_eq;

fn host(devices: usize, device: usize) -> (Arc<HostBackend>, ExecutionContext) {
    let backend = Arc::new(HostBackend::new(devices));
    let ctx = ExecutionContext::builder()
        .backend(backend.clone())
        .device(device)
        .build()
        .unwrap();
    (backend, ctx)
}

fn batch() -> TensorList {
    TensorList::new(vec![Tensor::vector(&[-1.5, 0.3, 2.0]), Tensor::vector(&[0.7, -0.2, 1.1])]).unwrap()
}

#[test]
fn test_forward_values() {
    let ctx = ExecutionContext::host();
    let x = || Some(LayerResult::constant(TensorList::single(Tensor::vector(&[-2.0, 0.0, 1.0]))));
    let relu = ActivationLayer::with_id(LayerId(1), ElementwiseOp::Relu);
    assert_eq!(relu.eval(&ctx, &[x()]).unwrap().data().get(0).unwrap().data(), &[0.0, 0.0, 1.0]);
    let sigmoid = ActivationLayer::with_id(LayerId(2), ElementwiseOp::Sigmoid);
    let y = sigmoid.eval(&ctx, &[x()]).unwrap();
    assert_relative_eq!(y.data().get(0).unwrap().data()[1], 0.5);
    let tanh = ActivationLayer::with_id(LayerId(3), ElementwiseOp::Tanh);
    let y = tanh.eval(&ctx, &[x()]).unwrap();
    assert_relative_eq!(y.data().get(0).unwrap().data()[2], 1.0_f64.tanh());
}

#[test]
fn test_gradient_check_all_modes() {
    init_logger();
    let ctx = ExecutionContext::host();
    for mode in [ElementwiseOp::Sigmoid, ElementwiseOp::Relu, ElementwiseOp::Tanh] {
        let layer = ActivationLayer::with_id(LayerId(1), mode);
        check_layer_gradients(&layer, &ctx, &[batch()], GradCheckConfig::default()).unwrap();
    }
}

#[test]
fn test_device_buffers_are_released() {
    let (backend, ctx) = host(2, 1);
    let layer = ActivationLayer::with_id(LayerId(1), ElementwiseOp::Tanh);
    let out = layer
        .eval(&ctx, &[Some(LayerResult::tracked(batch(), probe_id(0)))])
        .unwrap();
    assert_eq!(backend.total_live_allocations(), 0);
    let mut delta = DeltaSet::new();
    out.accumulate(&ctx, &mut delta, &batch()).unwrap();
    assert_eq!(backend.total_live_allocations(), 0);
    assert_eq!(backend.bound_device(), Some(1));
}

#[test]
fn test_backward_on_unbound_thread() {
    let (backend, ctx) = host(1, 0);
    let layer = ActivationLayer::with_id(LayerId(1), ElementwiseOp::Sigmoid);
    let out = layer
        .eval(&ctx, &[Some(LayerResult::tracked(batch(), probe_id(0)))])
        .unwrap();
    let delta = std::thread::spawn({
        let ctx = ctx.clone();
        let backend = backend.clone();
        move || {
            assert_eq!(backend.bound_device(), None);
            let mut delta = DeltaSet::new();
            out.accumulate(&ctx, &mut delta, &batch()).map(|_| delta)
        }
    })
    .join()
    .unwrap()
    .unwrap();
    assert!(delta.get(probe_id(0), 1).is_some());
    assert_eq!(backend.total_live_allocations(), 0);
}

#[test]
fn test_device_failures_surface_as_component_errors() {
    init_logger();
    let (backend, ctx) = host(1, 0);
    let layer = ActivationLayer::with_id(LayerId(1), ElementwiseOp::Relu);
    let x = || Some(LayerResult::tracked(batch(), probe_id(0)));

    backend.fail_next_launch();
    match layer.eval(&ctx, &[x()]).unwrap_err() {
        DeltaGraphError::Component { shapes, source, .. } => {
            assert_eq!(shapes, vec![vec![2, 3], vec![2, 3]]);
            assert!(matches!(source, crate::device::DeviceError::Kernel { .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(backend.total_live_allocations(), 0);

    let out = layer.eval(&ctx, &[x()]).unwrap();
    backend.fail_next_alloc();
    let mut delta = DeltaSet::new();
    assert!(matches!(
        out.accumulate(&ctx, &mut delta, &batch()),
        Err(DeltaGraphError::Component { .. })
    ));
    assert!(delta.is_empty());
    assert_eq!(backend.total_live_allocations(), 0);
}

#[test]
fn test_single_precision_rounds_outputs() {
    let backend = Arc::new(HostBackend::new(1));
    let ctx = ExecutionContext::builder()
        .backend(backend)
        .precision(Precision::Single)
        .build()
        .unwrap();
    let layer = ActivationLayer::with_id(LayerId(1), ElementwiseOp::Relu);
    let x = Some(LayerResult::constant(TensorList::single(Tensor::vector(&[0.1]))));
    let y = layer.eval(&ctx, &[x]).unwrap();
    assert_eq!(y.data().get(0).unwrap().data()[0], 0.1_f32 as f64);
}

#[test]
fn test_json_round_trip() {
    let layer = ActivationLayer::with_id(LayerId(4), ElementwiseOp::Sigmoid);
    let value = layer.to_json(SerialPrecision::Double).unwrap();
    assert_eq!(value["mode"], "sigmoid");
    let copy = LayerRegistry::builtin().decode(&value).unwrap();
    assert_eq!(copy.to_json(SerialPrecision::Double).unwrap(), value);
}
