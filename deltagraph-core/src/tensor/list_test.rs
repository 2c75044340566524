use super::*;

fn list(rows: &[&[f64]]) -> TensorList {
    TensorList::new(rows.iter().map(|r| Tensor::vector(r)).collect()).unwrap()
}

#[test]
fn test_new_rejects_empty() {
    assert_eq!(TensorList::new(vec![]), Err(DeltaGraphError::EmptyTensorList));
}

#[test]
fn test_new_rejects_mixed_shapes() {
    let result = TensorList::new(vec![Tensor::zeros(&[2]), Tensor::zeros(&[3])]);
    match result {
        Err(DeltaGraphError::ShapeMismatch { expected, actual, .. }) => {
            assert_eq!(expected, vec![2]);
            assert_eq!(actual, vec![3]);
        }
        other => panic!("Expected ShapeMismatch, got {:?}", other),
    }
}

#[test]
fn test_add_returns_new_list() {
    let a = list(&[&[1.0, 2.0], &[3.0, 4.0]]);
    let b = list(&[&[10.0, 20.0], &[30.0, 40.0]]);
    let c = a.add(&b).unwrap();
    assert_eq!(c.get(0).unwrap().data(), &[11.0, 22.0]);
    assert_eq!(c.get(1).unwrap().data(), &[33.0, 44.0]);
    // Inputs untouched.
    assert_eq!(a.get(0).unwrap().data(), &[1.0, 2.0]);
}

#[test]
fn test_add_batch_mismatch() {
    let a = list(&[&[1.0], &[2.0]]);
    let b = list(&[&[1.0]]);
    assert!(matches!(a.add(&b), Err(DeltaGraphError::BatchMismatch { expected: 2, actual: 1, .. })));
}

#[test]
fn test_flatten_and_from_flat() {
    let a = list(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
    let flat = a.flatten();
    assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let b = TensorList::from_flat(&flat, 2, &[3]).unwrap();
    assert_eq!(a, b);
    assert_eq!(b.batch_shape(), vec![2, 3]);
    assert!(TensorList::from_flat(&flat, 4, &[3]).is_err());
}

#[test]
fn test_clone_shares_storage() {
    let a = list(&[&[1.0]]);
    let b = a.clone();
    assert!(a.ptr_eq(&b));
    let c = a.scale(1.0);
    assert!(!a.ptr_eq(&c));
    assert_eq!(a, c);
}
