//! # Mini-batch regression with partitioned evaluation
//!
//! Fits `y = 3·x0 - 2·x1 + 0.5` with a dense + bias network. Each mini-batch
//! from a shuffled `DataLoader` is split across the rayon pool by a
//! `PartitionedTrainable`; the merged, normalized delta drives a plain
//! gradient-descent step.
//!
//! Run with `RUST_LOG=info cargo run -p deltagraph-data --example partitioned_regression`.

use deltagraph_core::layers::{BiasLayer, DenseLayer, MeanSqLossLayer};
use deltagraph_core::{DagNetwork, DeltaGraphError, DeltaSet, ExecutionContext, IdGenerator, PointSample, Tensor};
use deltagraph_data::{DataLoader, LabeledDataset, PartitionedTrainable, RandomSampler, Trainable};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn apply(delta: &DeltaSet, learning_rate: f64) -> Result<(), DeltaGraphError> {
    for (_, d) in delta.iter() {
        d.target().write().add_assign(&d.gradient().scale(-learning_rate))?;
    }
    Ok(())
}

fn main() -> Result<(), DeltaGraphError> {
    env_logger::init();
    let ctx = ExecutionContext::from_env()?;
    let mut rng = StdRng::seed_from_u64(17);

    let dataset = LabeledDataset::from_fn(256, |_| {
        let (a, b) = (rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        (Tensor::vector(&[a, b]), Tensor::vector(&[3.0 * a - 2.0 * b + 0.5]))
    })?;

    let ids = IdGenerator::sequential();
    let mut net = DagNetwork::new(ids.clone(), 2);
    let y = net.input_nodes()[1];
    let prediction = net
        .input(0)?
        .then(Arc::new(DenseLayer::new(&ids, 2, 1, &mut rng)?))?
        .then(Arc::new(BiasLayer::new(&ids, &[1])))?
        .id();
    net.add(Arc::new(MeanSqLossLayer::new(&ids)), &[prediction, y])?;

    let trainable = PartitionedTrainable::per_thread(Arc::new(net));
    let sampler = RandomSampler::new(false, None).with_seed(5);
    let mut loader = DataLoader::new(dataset, 32, sampler, false, None);

    for epoch in 0..40 {
        loader.reset();
        let mut epoch_sample = PointSample::empty();
        for batch in loader.by_ref() {
            let sample = trainable.measure(&ctx, &batch?)?;
            apply(&sample.normalized(), 0.2)?;
            epoch_sample.merge(&sample)?;
        }
        if epoch % 10 == 0 {
            info!("epoch {:2}: mean loss {:.6}", epoch, epoch_sample.mean_loss().unwrap_or(f64::NAN));
        }
    }

    for (layer, slot, param) in trainable.network().named_state() {
        info!("layer {} slot {}: {:?}", layer, slot, param.snapshot().data());
    }
    Ok(())
}
