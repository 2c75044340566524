use super::*;
use crate::grad_check::{check_layer_gradients, probe_id, GradCheckConfig};
use approx::assert_relative_eq;

#[test]
fn test_per_item_loss() {
    let ctx = ExecutionContext::host();
    let layer = MeanSqLossLayer::with_id(LayerId(1));
    let prediction = TensorList::new(vec![Tensor::vector(&[1.0, 3.0]), Tensor::vector(&[0.0, 0.0])]).unwrap();
    let target = TensorList::new(vec![Tensor::vector(&[0.0, 1.0]), Tensor::vector(&[0.0, 0.0])]).unwrap();
    let out = layer
        .eval(
            &ctx,
            &[
                Some(LayerResult::tracked(prediction, probe_id(0))),
                Some(LayerResult::tracked(target, probe_id(1))),
            ],
        )
        .unwrap();
    assert_eq!(out.data().item_shape(), &[1]);
    assert_relative_eq!(out.data().get(0).unwrap().data()[0], 2.5);
    assert_relative_eq!(out.data().get(1).unwrap().data()[0], 0.0);

    let mut delta = DeltaSet::new();
    let ones = TensorList::new(vec![Tensor::vector(&[1.0]), Tensor::vector(&[1.0])]).unwrap();
    out.accumulate(&ctx, &mut delta, &ones).unwrap();
    assert_eq!(delta.get(probe_id(0), 0).unwrap().data(), &[1.0, 2.0]);
    assert_eq!(delta.get(probe_id(1), 0).unwrap().data(), &[-1.0, -2.0]);
}

#[test]
fn test_gradient_check() {
    let layer = MeanSqLossLayer::with_id(LayerId(1));
    let p = TensorList::new(vec![Tensor::vector(&[0.3, -1.2, 2.0]), Tensor::vector(&[1.0, 0.0, -0.5])]).unwrap();
    let t = TensorList::new(vec![Tensor::vector(&[0.0, 1.0, 1.5]), Tensor::vector(&[-1.0, 0.4, 0.5])]).unwrap();
    check_layer_gradients(&layer, &ExecutionContext::host(), &[p, t], GradCheckConfig::default()).unwrap();
}

#[test]
fn test_requires_both_inputs() {
    let layer = MeanSqLossLayer::with_id(LayerId(1));
    let p = Some(LayerResult::constant(TensorList::single(Tensor::vector(&[1.0]))));
    assert!(matches!(
        layer.eval(&ExecutionContext::host(), &[p.clone()]),
        Err(DeltaGraphError::Arity { .. })
    ));
    assert!(matches!(
        layer.eval(&ExecutionContext::host(), &[p, None]),
        Err(DeltaGraphError::MissingValue { slot: 1, .. })
    ));
}
