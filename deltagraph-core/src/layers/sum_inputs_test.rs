use super::*;
use crate::grad_check::{check_layer_gradients, probe_id, GradCheckConfig};
use crate::tensor::Tensor;

fn list(values: &[f64]) -> TensorList {
    TensorList::single(Tensor::vector(values))
}

#[test]
fn test_sums_present_inputs() {
    let ctx = ExecutionContext::host();
    let layer = SumInputsLayer::with_id(LayerId(1));
    assert!(layer.accepts_missing(3));
    let inputs = vec![
        Some(LayerResult::tracked(list(&[1.0, 2.0]), probe_id(0))),
        None,
        Some(LayerResult::constant(list(&[10.0, 20.0]))),
    ];
    let out = layer.eval(&ctx, &inputs).unwrap();
    assert_eq!(out.data().get(0).unwrap().data(), &[11.0, 22.0]);
    let mut delta = DeltaSet::new();
    out.accumulate(&ctx, &mut delta, &list(&[0.5, -1.0])).unwrap();
    assert_eq!(delta.get(probe_id(0), 0).unwrap().data(), &[0.5, -1.0]);
    assert_eq!(delta.len(), 1);
}

#[test]
fn test_all_missing_is_an_error() {
    let layer = SumInputsLayer::with_id(LayerId(1));
    assert!(matches!(
        layer.eval(&ExecutionContext::host(), &[None, None]),
        Err(DeltaGraphError::MissingValue { .. })
    ));
}

#[test]
fn test_batch_mismatch() {
    let layer = SumInputsLayer::with_id(LayerId(1));
    let two = TensorList::new(vec![Tensor::scalar(1.0), Tensor::scalar(2.0)]).unwrap();
    let inputs = vec![
        Some(LayerResult::constant(two)),
        Some(LayerResult::constant(TensorList::single(Tensor::scalar(1.0)))),
    ];
    assert!(matches!(
        layer.eval(&ExecutionContext::host(), &inputs),
        Err(DeltaGraphError::BatchMismatch { .. })
    ));
}

#[test]
fn test_gradient_check() {
    let layer = SumInputsLayer::with_id(LayerId(1));
    let a = TensorList::new(vec![Tensor::vector(&[1.0, -2.0]), Tensor::vector(&[0.5, 0.25])]).unwrap();
    let b = a.scale(-3.0);
    check_layer_gradients(&layer, &ExecutionContext::host(), &[a.clone(), b, a], GradCheckConfig::default()).unwrap();
}
