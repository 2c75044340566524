use super::*;
use crate::datasets::{LabeledDataset, VecDataset};
use crate::samplers::{RandomSampler, SequentialSampler, SubsetRandomSampler};
use deltagraph_core::Tensor;

fn drain<D: Dataset, S: Sampler>(loader: &mut DataLoader<D, S>) -> Vec<Vec<D::Item>> {
    loader.by_ref().map(|batch| batch.unwrap()).collect()
}

#[test]
fn test_dataloader_sequential() {
    let mut loader = DataLoader::new(VecDataset::new(vec![1, 2, 3, 4, 5, 6]), 2, SequentialSampler::new(), false, None);
    assert_eq!(loader.num_batches(), 3);
    assert_eq!(drain(&mut loader), vec![vec![1, 2], vec![3, 4], vec![5, 6]]);
    assert!(loader.next().is_none());
}

#[test]
fn test_dataloader_drop_last() {
    let mut loader = DataLoader::new(VecDataset::new(vec![1, 2, 3, 4, 5]), 2, SequentialSampler::new(), true, None);
    assert_eq!(loader.num_batches(), 2);
    assert_eq!(drain(&mut loader), vec![vec![1, 2], vec![3, 4]]);

    let mut keep = DataLoader::new(VecDataset::new(vec![1, 2, 3, 4, 5]), 2, SequentialSampler::new(), false, None);
    assert_eq!(keep.num_batches(), 3);
    assert_eq!(drain(&mut keep).last().unwrap(), &vec![5]);
}

#[test]
fn test_dataloader_reset_starts_new_epoch() {
    let sampler = RandomSampler::new(false, None).with_seed(5);
    let mut loader = DataLoader::new(VecDataset::new((0..12).collect::<Vec<_>>()), 5, sampler, false, None);
    let mut first: Vec<i32> = drain(&mut loader).into_iter().flatten().collect();
    loader.reset();
    let mut second: Vec<i32> = drain(&mut loader).into_iter().flatten().collect();
    first.sort_unstable();
    second.sort_unstable();
    assert_eq!(first, (0..12).collect::<Vec<_>>());
    assert_eq!(first, second);
}

#[test]
fn test_dataloader_surfaces_dataset_errors() {
    let sampler = SubsetRandomSampler::new(vec![0, 9]).with_seed(1);
    let mut loader = DataLoader::new(VecDataset::new(vec![1.0, 2.0]), 2, sampler, false, None);
    assert!(matches!(loader.next(), Some(Err(DeltaGraphError::IndexOutOfBounds { .. }))));
}

#[test]
fn test_dataloader_collate() {
    let dataset = LabeledDataset::from_fn(3, |i| (Tensor::vector(&[i as f64]), Tensor::vector(&[0.0]))).unwrap();
    let scale: CollateFn<LabeledDataset> = Box::new(|batch| {
        Ok(batch.into_iter().map(|(x, y)| (x.scale(10.0), y)).collect())
    });
    let mut loader = DataLoader::new(dataset, 3, SequentialSampler::new(), false, Some(scale));
    let batch = loader.next().unwrap().unwrap();
    let xs: Vec<f64> = batch.iter().map(|(x, _)| x.data()[0]).collect();
    assert_eq!(xs, vec![0.0, 10.0, 20.0]);
}
