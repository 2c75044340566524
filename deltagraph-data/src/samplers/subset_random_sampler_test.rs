use super::*;

#[test]
fn test_subset_sampler_permutes_subset() {
    let sampler = SubsetRandomSampler::new(vec![7, 3, 9, 1]);
    assert_eq!(sampler.len(100), 4);
    let mut drawn: Vec<usize> = sampler.iter(100).collect();
    drawn.sort_unstable();
    assert_eq!(drawn, vec![1, 3, 7, 9]);
}

#[test]
fn test_subset_sampler_empty() {
    let sampler = SubsetRandomSampler::new(Vec::new());
    assert_eq!(sampler.iter(10).count(), 0);
}

#[test]
fn test_seeded_subset_sampler_repeats() {
    let sampler = SubsetRandomSampler::new((0..20).collect()).with_seed(3);
    let a: Vec<usize> = sampler.iter(20).collect();
    let b: Vec<usize> = sampler.iter(20).collect();
    assert_eq!(a, b);
}
