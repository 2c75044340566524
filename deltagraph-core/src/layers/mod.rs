//! Reference layers.

use crate::error::DeltaGraphError;
use crate::tensor::{Tensor, TensorList};
use rayon::prelude::*;

pub mod abs;
pub mod activation;
pub mod bias;
pub mod dense;
pub mod loss;
pub mod max_inputs;
pub mod max_pool;
pub mod probe;
pub mod softmax;
pub mod sum_inputs;

pub use abs::AbsLayer;
pub use activation::ActivationLayer;
pub use bias::BiasLayer;
pub use dense::DenseLayer;
pub use loss::MeanSqLossLayer;
pub use max_inputs::MaxInputsLayer;
pub use max_pool::MaxPoolLayer;
pub use probe::ProbeLayer;
pub use softmax::SoftmaxLayer;
pub use sum_inputs::SumInputsLayer;

/// Applies `f` to every batch item, fanning out over the rayon pool.
/// Output order matches input order.
pub(crate) fn par_map_items<F>(list: &TensorList, f: F) -> Result<TensorList, DeltaGraphError>
where
    F: Fn(&Tensor) -> Result<Tensor, DeltaGraphError> + Sync + Send,
{
    let items = list.as_slice().par_iter().map(f).collect::<Result<Vec<_>, _>>()?;
    TensorList::new(items)
}

/// Item-wise `f(a[i], b[i])` over two lists of equal length.
pub(crate) fn par_zip_items<F>(a: &TensorList, b: &TensorList, f: F) -> Result<TensorList, DeltaGraphError>
where
    F: Fn(&Tensor, &Tensor) -> Result<Tensor, DeltaGraphError> + Sync + Send,
{
    if a.len() != b.len() {
        return Err(DeltaGraphError::BatchMismatch {
            expected: a.len(),
            actual: b.len(),
            operation: "par_zip_items".to_string(),
        });
    }
    let items = a
        .as_slice()
        .par_iter()
        .zip(b.as_slice().par_iter())
        .map(|(x, y)| f(x, y))
        .collect::<Result<Vec<_>, _>>()?;
    TensorList::new(items)
}
