//! Helpers shared by the unit tests.

use std::sync::Once;

static LOGGER: Once = Once::new();

/// Routes `log` output through the test harness. Level comes from `RUST_LOG`.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Element-wise comparison of two float slices within `epsilon`.
#[macro_export]
macro_rules! assert_all_close {
    ($left:expr, $right:expr, epsilon = $epsilon:expr) => {{
        let left: &[f64] = $left;
        let right: &[f64] = $right;
        assert_eq!(left.len(), right.len(), "length mismatch: {:?} vs {:?}", left, right);
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            if (l - r).abs() > $epsilon {
                panic!(
                    "assertion failed at element {}: `{}` vs `{}` (epsilon {})\n  left: `{:?}`\n right: `{:?}`",
                    i, l, r, $epsilon, left, right
                );
            }
        }
    }};
    ($left:expr, $right:expr) => {
        $crate::assert_all_close!($left, $right, epsilon = 1e-9_f64)
    };
}
