use super::*;
use crate::grad_check::{check_layer_gradients, probe_id, GradCheckConfig};
use approx::assert_abs_diff_eq;

#[test]
fn test_known_values() {
    let ctx = ExecutionContext::host();
    let layer = SoftmaxLayer::with_id(LayerId(1));
    let x = LayerResult::tracked(TensorList::single(Tensor::vector(&[1.0, 2.0, 3.0])), probe_id(0));
    let out = layer.eval(&ctx, &[Some(x)]).unwrap();
    let y = out.data().get(0).unwrap().data().to_vec();
    assert_abs_diff_eq!(y[0], 0.0900, epsilon = 1e-4);
    assert_abs_diff_eq!(y[1], 0.2447, epsilon = 1e-4);
    assert_abs_diff_eq!(y[2], 0.6652, epsilon = 1e-4);
    assert_abs_diff_eq!(y.iter().sum::<f64>(), 1.0, epsilon = 1e-12);

    let mut delta = DeltaSet::new();
    out.accumulate(&ctx, &mut delta, &TensorList::single(Tensor::vector(&[1.0, 0.0, 0.0])))
        .unwrap();
    let dx = delta.get(probe_id(0), 0).unwrap();
    assert_abs_diff_eq!(dx.sum(), 0.0, epsilon = 1e-12);
    // d y0 / d x0 = y0 (1 - y0)
    assert_abs_diff_eq!(dx.data()[0], y[0] * (1.0 - y[0]), epsilon = 1e-12);
}

#[test]
fn test_rows_are_independent() {
    let ctx = ExecutionContext::host();
    let layer = SoftmaxLayer::with_id(LayerId(1));
    let x = Tensor::new(vec![0.0, 0.0, 1000.0, 1000.0], vec![2, 2]).unwrap();
    let out = layer
        .eval(&ctx, &[Some(LayerResult::constant(TensorList::single(x)))])
        .unwrap();
    assert_eq!(out.data().get(0).unwrap().data(), &[0.5, 0.5, 0.5, 0.5]);
}

#[test]
fn test_non_finite_inputs_are_sanitized() {
    let ctx = ExecutionContext::host();
    let layer = SoftmaxLayer::with_id(LayerId(1));
    assert_eq!(layer.numeric_policy(), NumericPolicy::Sanitize);
    let x = LayerResult::tracked(
        TensorList::single(Tensor::vector(&[f64::NAN, 0.0, f64::INFINITY])),
        probe_id(0),
    );
    let out = layer.eval(&ctx, &[Some(x)]).unwrap();
    for v in out.data().get(0).unwrap().data() {
        assert_abs_diff_eq!(*v, 1.0 / 3.0, epsilon = 1e-12);
    }
    let mut delta = DeltaSet::new();
    out.accumulate(&ctx, &mut delta, &TensorList::single(Tensor::vector(&[1.0, 0.0, 0.0])))
        .unwrap();
    let dx = delta.get(probe_id(0), 0).unwrap().data().to_vec();
    assert_eq!(dx[0], 0.0);
    assert_eq!(dx[2], 0.0);
    assert_abs_diff_eq!(dx[1], -1.0 / 9.0, epsilon = 1e-12);
}

#[test]
fn test_gradient_check() {
    let layer = SoftmaxLayer::with_id(LayerId(1));
    let x = TensorList::new(vec![
        Tensor::new(vec![0.1, -0.4, 1.2, 0.7, 0.0, -1.1], vec![2, 3]).unwrap(),
        Tensor::new(vec![2.0, 1.0, 0.5, -0.5, 0.3, 0.9], vec![2, 3]).unwrap(),
    ])
    .unwrap();
    check_layer_gradients(&layer, &ExecutionContext::host(), &[x], GradCheckConfig::default()).unwrap();
}

#[test]
fn test_json_round_trip() {
    let value = SoftmaxLayer::with_id(LayerId(8)).to_json(SerialPrecision::Double).unwrap();
    let copy = SoftmaxLayer::from_json(&value, &LayerRegistry::builtin()).unwrap();
    assert_eq!(copy.id(), LayerId(8));
    assert_eq!(copy.class(), SoftmaxLayer::CLASS);
}
