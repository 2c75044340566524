use super::*;

#[test]
fn test_clones_share_the_buffer() {
    let p = Parameter::new(Tensor::vector(&[1.0, 2.0]));
    let q = p.clone();
    q.write().data_mut()[0] = 10.0;
    assert_eq!(p.snapshot().data(), &[10.0, 2.0]);
    assert!(p.ptr_eq(&q));
}

#[test]
fn test_snapshot_is_detached() {
    let p = Parameter::new(Tensor::vector(&[1.0]));
    let snap = p.snapshot();
    p.assign(Tensor::vector(&[5.0]));
    assert_eq!(snap.data(), &[1.0]);
    assert_eq!(p.shape(), vec![1]);
    assert!(!p.ptr_eq(&Parameter::new(snap)));
}
