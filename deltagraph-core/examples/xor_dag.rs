//! # Training a small DAG on XOR
//!
//! Builds a network with a skip connection:
//!
//! ```text
//! x ─ dense ─ bias ─ tanh ─ dense ─┬─ sum ─ loss(·, y)
//! x ─────────────── dense ─────────┘
//! ```
//!
//! then runs a plain gradient-descent loop on top of `train::evaluate`,
//! saves the trained network to JSON and checks the reloaded copy predicts
//! the same values.
//!
//! Run with `RUST_LOG=info cargo run --example xor_dag`. The device can be
//! selected with `DELTAGRAPH_DEVICE` (e.g. `host:0`).

use deltagraph_core::layers::{ActivationLayer, BiasLayer, DenseLayer, MeanSqLossLayer, SumInputsLayer};
use deltagraph_core::train::evaluate;
use deltagraph_core::{
    DagNetwork, DeltaGraphError, DeltaSet, ElementwiseOp, ExecutionContext, IdGenerator, LayerRegistry,
    SerialPrecision, Tensor, TensorList,
};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn build(ids: &IdGenerator, rng: &mut StdRng) -> Result<(DagNetwork, deltagraph_core::NodeId), DeltaGraphError> {
    let mut net = DagNetwork::new(ids.clone(), 2);
    let (x, y) = (net.input_nodes()[0], net.input_nodes()[1]);
    let deep = net
        .input(0)?
        .then(Arc::new(DenseLayer::new(ids, 2, 8, rng)?))?
        .then(Arc::new(BiasLayer::new(ids, &[8])))?
        .then(Arc::new(ActivationLayer::new(ids, ElementwiseOp::Tanh)))?
        .then(Arc::new(DenseLayer::new(ids, 8, 1, rng)?))?
        .id();
    let skip = net.add(Arc::new(DenseLayer::new(ids, 2, 1, rng)?), &[x])?.id();
    let prediction = net.add(Arc::new(SumInputsLayer::new(ids)), &[deep, skip])?.id();
    net.add(Arc::new(MeanSqLossLayer::new(ids)), &[prediction, y])?;
    Ok((net, prediction))
}

fn apply(delta: &DeltaSet, learning_rate: f64) -> Result<(), DeltaGraphError> {
    for (_, d) in delta.iter() {
        d.target().write().add_assign(&d.gradient().scale(-learning_rate))?;
    }
    Ok(())
}

fn predict(net: &DagNetwork, ctx: &ExecutionContext, prediction: deltagraph_core::NodeId, x: &[f64]) -> Result<f64, DeltaGraphError> {
    // Evaluate only the prediction branch; the label input is never read.
    let mut cache = deltagraph_core::graph::EvaluationCache::new();
    let inputs = net.input_nodes();
    cache.seed(inputs[0], deltagraph_core::LayerResult::constant(TensorList::single(Tensor::vector(x))));
    let out = net.get(ctx, &mut cache, prediction)?;
    Ok(out.data().as_slice()[0].data()[0])
}

fn main() -> Result<(), DeltaGraphError> {
    env_logger::init();
    let ctx = ExecutionContext::from_env()?;
    let ids = IdGenerator::sequential();
    let mut rng = StdRng::seed_from_u64(2024);
    let (net, prediction) = build(&ids, &mut rng)?;

    let batch: Vec<(Tensor, Tensor)> = [([0.0, 0.0], 0.0), ([0.0, 1.0], 1.0), ([1.0, 0.0], 1.0), ([1.0, 1.0], 0.0)]
        .iter()
        .map(|(x, y)| (Tensor::vector(x), Tensor::vector(&[*y])))
        .collect();

    for epoch in 0..2000 {
        let sample = evaluate(&net, &ctx, &batch)?;
        apply(&sample.normalized(), 0.1)?;
        if epoch % 250 == 0 {
            info!("epoch {:4}: mean loss {:.6}", epoch, sample.mean_loss().unwrap_or(f64::NAN));
        }
    }

    let json = net.to_json_string(SerialPrecision::Double)?;
    let restored = DagNetwork::from_json_str(&json, &LayerRegistry::builtin())?;
    for (x, y) in &batch {
        let a = predict(&net, &ctx, prediction, x.data())?;
        let b = predict(&restored, &ctx, prediction, x.data())?;
        println!("{:?} -> {:.3} (target {}, reloaded {:.3})", x.data(), a, y.data()[0], b);
    }
    Ok(())
}
