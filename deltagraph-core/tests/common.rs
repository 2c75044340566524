use deltagraph_core::layers::{ActivationLayer, BiasLayer, DenseLayer, MeanSqLossLayer};
use deltagraph_core::{DagNetwork, DeltaSet, ElementwiseOp, IdGenerator, NodeId, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

#[allow(dead_code)]
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// `loss(dense(tanh(bias(dense(x)))), y)` with seeded weights. Returns the
/// network and its prediction node.
#[allow(dead_code)]
pub fn regression_network(inputs: usize, hidden: usize, seed: u64) -> (DagNetwork, NodeId) {
    let ids = IdGenerator::sequential();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut net = DagNetwork::new(ids.clone(), 2);
    let labels = net.input_nodes()[1];
    let prediction = net
        .input(0)
        .unwrap()
        .then(Arc::new(DenseLayer::new(&ids, inputs, hidden, &mut rng).unwrap()))
        .unwrap()
        .then(Arc::new(BiasLayer::new(&ids, &[hidden])))
        .unwrap()
        .then(Arc::new(ActivationLayer::new(&ids, ElementwiseOp::Tanh)))
        .unwrap()
        .then(Arc::new(DenseLayer::new(&ids, hidden, 1, &mut rng).unwrap()))
        .unwrap()
        .id();
    net.add(Arc::new(MeanSqLossLayer::new(&ids)), &[prediction, labels])
        .unwrap();
    (net, prediction)
}

/// Points of `y = 0.5 x0 - x1 + 0.25`.
#[allow(dead_code)]
pub fn linear_batch(n: usize, seed: u64) -> Vec<(Tensor, Tensor)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let x0: f64 = rng.gen_range(-1.0..1.0);
            let x1: f64 = rng.gen_range(-1.0..1.0);
            (Tensor::vector(&[x0, x1]), Tensor::vector(&[0.5 * x0 - x1 + 0.25]))
        })
        .collect()
}

/// Plain gradient descent on the buffers a delta refers to.
#[allow(dead_code)]
pub fn sgd_step(delta: &DeltaSet, learning_rate: f64) {
    for (_, d) in delta.iter() {
        let step = d.gradient().scale(-learning_rate);
        d.target().write().add_assign(&step).unwrap();
    }
}
