use super::*;

#[test]
fn test_host_defaults() {
    let ctx = ExecutionContext::host();
    assert_eq!(ctx.device(), 0);
    assert_eq!(ctx.precision(), Precision::Double);
    assert_eq!(ctx.backend().name(), "host");
}

#[test]
fn test_builder_rejects_missing_device() {
    let result = ExecutionContext::builder()
        .backend(Arc::new(HostBackend::new(2)))
        .device(2)
        .build();
    assert!(matches!(result, Err(DeltaGraphError::Configuration(_))));
}

#[test]
fn test_with_device_shares_backend() {
    let ctx = ExecutionContext::builder()
        .backend(Arc::new(HostBackend::new(2)))
        .build()
        .unwrap();
    let other = ctx.with_device(1).unwrap();
    assert_eq!(other.device(), 1);
    assert!(Arc::ptr_eq(&ctx.shared_backend(), &other.shared_backend()));
    assert!(ctx.with_device(5).is_err());
}

#[test]
fn test_precision_parsing_and_rounding() {
    assert_eq!("single".parse::<Precision>().unwrap(), Precision::Single);
    assert_eq!(" F64 ".parse::<Precision>().unwrap(), Precision::Double);
    assert!("half".parse::<Precision>().is_err());
    assert_eq!(Precision::Double.round(0.1), 0.1);
    assert_eq!(Precision::Single.round(0.1), 0.1_f32 as f64);
}

#[test]
fn test_from_settings() {
    let ctx = ExecutionContext::from_settings(Some("host:2"), Some("single")).unwrap();
    assert_eq!(ctx.device(), 2);
    assert_eq!(ctx.backend().device_count(), 3);
    assert_eq!(ctx.precision(), Precision::Single);

    let default = ExecutionContext::from_settings(None, None).unwrap();
    assert_eq!(default.device(), 0);

    assert!(ExecutionContext::from_settings(Some("tpu:0"), None).is_err());
    assert!(ExecutionContext::from_settings(Some("host:x"), None).is_err());
}

#[cfg(not(feature = "cuda"))]
#[test]
fn test_cuda_requires_feature() {
    assert!(matches!(
        ExecutionContext::from_settings(Some("cuda:0"), None),
        Err(DeltaGraphError::Configuration(_))
    ));
}
