use super::*;
use std::collections::HashSet;

#[test]
fn test_random_sampler_len() {
    assert_eq!(RandomSampler::new(false, None).len(10), 10);
    assert_eq!(RandomSampler::new(false, Some(5)).len(10), 5);
}

#[test]
fn test_without_replacement_yields_distinct_indices() {
    let sampler = RandomSampler::new(false, Some(5));
    let indices: Vec<usize> = sampler.iter(10).collect();
    assert_eq!(indices.len(), 5);
    let unique: HashSet<usize> = indices.iter().copied().collect();
    assert_eq!(unique.len(), 5);
    assert!(unique.iter().all(|&i| i < 10));

    let full: HashSet<usize> = RandomSampler::new(false, None).iter(10).collect();
    assert_eq!(full, (0..10).collect());
}

#[test]
fn test_without_replacement_oversampling_is_empty() {
    let sampler = RandomSampler::new(false, Some(10));
    assert_eq!(sampler.iter(5).count(), 0);
}

#[test]
fn test_with_replacement_may_exceed_dataset() {
    let sampler = RandomSampler::new(true, Some(10));
    let indices: Vec<usize> = sampler.iter(5).collect();
    assert_eq!(indices.len(), 10);
    assert!(indices.iter().all(|&i| i < 5));
}

#[test]
fn test_empty_dataset() {
    assert_eq!(RandomSampler::new(false, None).iter(0).count(), 0);
    assert_eq!(RandomSampler::new(true, Some(3)).iter(0).count(), 0);
}

#[test]
fn test_seeded_sampler_is_reproducible_per_epoch() {
    let a = RandomSampler::new(false, None).with_seed(11);
    let b = RandomSampler::new(false, None).with_seed(11);
    let a1: Vec<usize> = a.iter(50).collect();
    let a2: Vec<usize> = a.iter(50).collect();
    let b1: Vec<usize> = b.iter(50).collect();
    let b2: Vec<usize> = b.iter(50).collect();
    assert_eq!(a1, b1);
    assert_eq!(a2, b2);
    assert_ne!(a1, a2);
}
