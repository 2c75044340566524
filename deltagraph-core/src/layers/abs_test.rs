use super::*;
use crate::grad_check::{check_layer_gradients, probe_id, GradCheckConfig};
use crate::tensor::Tensor;

fn eval(layer: &AbsLayer, input: LayerResult) -> Result<LayerResult, DeltaGraphError> {
    layer.eval(&ExecutionContext::host(), &[Some(input)])
}

#[test]
fn test_forward_and_backward() {
    let ctx = ExecutionContext::host();
    let layer = AbsLayer::with_id(LayerId(1));
    let x = TensorList::single(Tensor::vector(&[-2.0, 0.0, 3.5]));
    let out = eval(&layer, LayerResult::tracked(x, probe_id(0))).unwrap();
    assert_eq!(out.data().get(0).unwrap().data(), &[2.0, 0.0, 3.5]);

    let mut delta = DeltaSet::new();
    out.accumulate(&ctx, &mut delta, &TensorList::single(Tensor::vector(&[1.0, 1.0, 2.0])))
        .unwrap();
    // The subgradient at 0 is taken as +1.
    assert_eq!(delta.get(probe_id(0), 0).unwrap().data(), &[-1.0, 1.0, 2.0]);
}

#[test]
fn test_gradient_check() {
    let layer = AbsLayer::with_id(LayerId(1));
    let x = TensorList::new(vec![
        Tensor::new(vec![-1.5, 0.25, 2.0, -0.75], vec![2, 2]).unwrap(),
        Tensor::new(vec![0.5, -3.0, 1.0, -0.1], vec![2, 2]).unwrap(),
    ])
    .unwrap();
    check_layer_gradients(&layer, &ExecutionContext::host(), &[x], GradCheckConfig::default()).unwrap();
}

#[test]
fn test_rejects_non_finite_and_bad_arity() {
    let layer = AbsLayer::with_id(LayerId(1));
    let x = LayerResult::constant(TensorList::single(Tensor::vector(&[f64::NAN])));
    assert!(matches!(eval(&layer, x), Err(DeltaGraphError::NumericAnomaly { .. })));
    assert!(matches!(
        layer.eval(&ExecutionContext::host(), &[]),
        Err(DeltaGraphError::Arity { .. })
    ));
    assert!(matches!(
        layer.eval(&ExecutionContext::host(), &[None]),
        Err(DeltaGraphError::MissingValue { slot: 0, .. })
    ));
}

#[test]
fn test_json_round_trip() {
    let layer = AbsLayer::with_id(LayerId(42));
    layer.set_frozen(true);
    let value = layer.to_json(SerialPrecision::Double).unwrap();
    assert_eq!(value["class"], "abs");
    let copy = LayerRegistry::builtin().decode(&value).unwrap();
    assert_eq!(copy.id(), LayerId(42));
    assert!(copy.is_frozen());
}
