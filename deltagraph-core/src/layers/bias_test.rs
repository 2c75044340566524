use super::*;
use crate::grad_check::{check_layer_gradients, probe_id, GradCheckConfig};

fn batch() -> TensorList {
    TensorList::new(vec![Tensor::vector(&[1.0, 2.0]), Tensor::vector(&[-1.0, 0.5])]).unwrap()
}

#[test]
fn test_forward_and_summed_parameter_delta() {
    let ctx = ExecutionContext::host();
    let bias = BiasLayer::with_bias(LayerId(1), Tensor::vector(&[0.5, -0.5]));
    let out = bias
        .eval(&ctx, &[Some(LayerResult::tracked(batch(), probe_id(0)))])
        .unwrap();
    assert_eq!(out.data().get(0).unwrap().data(), &[1.5, 1.5]);
    assert_eq!(out.data().get(1).unwrap().data(), &[-0.5, 0.0]);

    let grad = TensorList::new(vec![Tensor::vector(&[1.0, 2.0]), Tensor::vector(&[3.0, 4.0])]).unwrap();
    let mut delta = DeltaSet::new();
    out.accumulate(&ctx, &mut delta, &grad).unwrap();
    assert_eq!(delta.get(LayerId(1), 0).unwrap().data(), &[4.0, 6.0]);
    assert_eq!(delta.get(probe_id(0), 1).unwrap().data(), &[3.0, 4.0]);
}

#[test]
fn test_liveness() {
    let ctx = ExecutionContext::host();
    let bias = BiasLayer::new(&crate::id::IdGenerator::sequential(), &[2]);
    let constant = || Some(LayerResult::constant(batch()));
    assert!(bias.eval(&ctx, &[constant()]).unwrap().is_alive());
    bias.set_frozen(true);
    assert!(!bias.eval(&ctx, &[constant()]).unwrap().is_alive());
}

#[test]
fn test_gradient_check() {
    let bias = BiasLayer::with_bias(LayerId(1), Tensor::vector(&[0.1, 0.2]));
    let report = check_layer_gradients(&bias, &ExecutionContext::host(), &[batch()], GradCheckConfig::default()).unwrap();
    assert_eq!(report.elements_checked, 6);
}

#[test]
fn test_float_precision_json() {
    let bias = BiasLayer::with_bias(LayerId(1), Tensor::vector(&[0.1, 0.25]));
    let value = bias.to_json(SerialPrecision::Float).unwrap();
    let copy = BiasLayer::from_json(&value, &LayerRegistry::builtin()).unwrap();
    assert_eq!(copy.state()[0].snapshot().data(), &[0.1_f32 as f64, 0.25]);
}
