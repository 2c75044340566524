use super::*;
use crate::datasets::LabeledDataset;
use crate::samplers::{RandomSampler, SequentialSampler};
use approx::assert_relative_eq;
use deltagraph_core::layers::{ActivationLayer, DenseLayer, MeanSqLossLayer};
use deltagraph_core::{ElementwiseOp, IdGenerator, Layer, LayerId};

/// loss(dense(x), y) with weights [1, 2]; returns the dense layer id.
fn regression() -> (Arc<DagNetwork>, LayerId) {
    let ids = IdGenerator::sequential();
    let mut net = DagNetwork::new(ids.clone(), 2);
    let (x, y) = (net.input_nodes()[0], net.input_nodes()[1]);
    let dense = Arc::new(DenseLayer::with_weights(ids.layer_id(), Tensor::new(vec![1.0, 2.0], vec![2, 1]).unwrap()).unwrap());
    let dense_id = dense.id();
    let prediction = net.add(dense, &[x]).unwrap().id();
    net.add(Arc::new(MeanSqLossLayer::new(&ids)), &[prediction, y]).unwrap();
    (Arc::new(net), dense_id)
}

fn dataset(len: usize) -> LabeledDataset {
    LabeledDataset::from_fn(len, |i| {
        let t = i as f64 / 4.0;
        (Tensor::vector(&[t, 1.0 - t]), Tensor::vector(&[0.5 * t]))
    })
    .unwrap()
}

#[test]
fn test_partitions_match_whole_batch() {
    let ctx = ExecutionContext::host();
    let (net, dense) = regression();
    let batch = dataset(7).items();
    let whole = net.measure(&ctx, &batch).unwrap();
    for partitions in [1, 2, 3, 7, 16] {
        let trainable = PartitionedTrainable::new(net.clone(), partitions).unwrap();
        let sample = trainable.measure(&ctx, &batch).unwrap();
        assert_eq!(sample.count(), 7);
        assert_relative_eq!(sample.loss_sum(), whole.loss_sum(), epsilon = 1e-12);
        let (a, b) = (sample.delta().get(dense, 0).unwrap(), whole.delta().get(dense, 0).unwrap());
        for (x, y) in a.data().iter().zip(b.data()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_zero_partitions_is_a_configuration_error() {
    let (net, _) = regression();
    assert!(matches!(
        PartitionedTrainable::new(net.clone(), 0),
        Err(DeltaGraphError::Configuration(_))
    ));
    assert!(PartitionedTrainable::per_thread(net).partitions() >= 1);
}

#[test]
fn test_failing_partition_fails_the_batch() {
    let ctx = ExecutionContext::host();
    let (net, _) = regression();
    let mut batch = dataset(6).items();
    batch[4].0 = Tensor::vector(&[f64::NAN, 0.0]);
    let trainable = PartitionedTrainable::new(net, 3).unwrap();
    assert!(matches!(
        trainable.measure(&ctx, &batch),
        Err(DeltaGraphError::NumericAnomaly { .. })
    ));
    assert_eq!(trainable.measure(&ctx, &[]).unwrap().count(), 0);
}

#[test]
fn test_epoch_is_independent_of_sampling_order() {
    let ctx = ExecutionContext::host();
    let (net, dense) = regression();
    let trainable = PartitionedTrainable::new(net, 2).unwrap();

    let mut ordered = DataLoader::new(dataset(10), 3, SequentialSampler::new(), false, None);
    let mut shuffled = DataLoader::new(dataset(10), 4, RandomSampler::new(false, None).with_seed(9), false, None);
    let a = trainable.measure_epoch(&ctx, &mut ordered).unwrap();
    let b = trainable.measure_epoch(&ctx, &mut shuffled).unwrap();
    assert_eq!(a.count(), 10);
    assert_eq!(b.count(), 10);
    assert_relative_eq!(a.loss_sum(), b.loss_sum(), epsilon = 1e-12);
    let (ga, gb) = (a.delta().get(dense, 0).unwrap(), b.delta().get(dense, 0).unwrap());
    for (x, y) in ga.data().iter().zip(gb.data()) {
        assert_relative_eq!(*x, *y, epsilon = 1e-12);
    }
}

#[test]
fn test_device_backed_partitions_in_a_busy_pool() {
    let ids = IdGenerator::sequential();
    let mut net = DagNetwork::new(ids.clone(), 2);
    let y = net.input_nodes()[1];
    let prediction = net
        .input(0)
        .unwrap()
        .then(Arc::new(ActivationLayer::new(&ids, ElementwiseOp::Tanh)))
        .unwrap()
        .id();
    net.add(Arc::new(MeanSqLossLayer::new(&ids)), &[prediction, y]).unwrap();
    let trainable = PartitionedTrainable::new(Arc::new(net), 32).unwrap();

    let batch: Vec<(Tensor, Tensor)> = (0..32)
        .map(|i| (Tensor::full(&[4096], i as f64 / 32.0), Tensor::zeros(&[4096])))
        .collect();
    let expected: f64 = (0..32).map(|i| (i as f64 / 32.0).tanh().powi(2)).sum();

    let ctx = ExecutionContext::host();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(8).build().unwrap();
    pool.install(|| {
        for _ in 0..25 {
            let sample = trainable.measure(&ctx, &batch).unwrap();
            assert_eq!(sample.count(), 32);
            assert_relative_eq!(sample.loss_sum(), expected, epsilon = 1e-9);
        }
    });
}
