use crate::error::DeltaGraphError;
use num_traits::{Float, NumCast};

/// Calculates the strides for a given shape.
/// Strides represent the number of elements to skip in the flattened data array
/// to move one step along each dimension.
///
/// Example:
/// shape = [2, 3] -> strides = [3, 1]
/// shape = [2, 2, 2] -> strides = [4, 2, 1]
pub fn calculate_strides(shape: &[usize]) -> Vec<usize> {
    if shape.is_empty() {
        return vec![];
    }
    let rank = shape.len();
    let mut strides = vec![1; rank];
    for i in (0..rank - 1).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Row-major flat offset of a multi-index, bounds-checked.
pub fn offset_of(index: &[usize], shape: &[usize]) -> Result<usize, DeltaGraphError> {
    if index.len() != shape.len() || index.iter().zip(shape.iter()).any(|(i, d)| i >= d) {
        return Err(DeltaGraphError::IndexOutOfBounds {
            index: index.to_vec(),
            shape: shape.to_vec(),
        });
    }
    let strides = calculate_strides(shape);
    Ok(index.iter().zip(strides.iter()).map(|(i, s)| i * s).sum())
}

/// Converts a flat row-major offset back to a multi-index.
pub fn index_to_coord(offset: usize, shape: &[usize]) -> Vec<usize> {
    let strides = calculate_strides(shape);
    let mut remaining = offset;
    strides
        .iter()
        .map(|&s| {
            let c = remaining / s;
            remaining %= s;
            c
        })
        .collect()
}

/// Rounds a value through the float type `F` and back to `f64`.
/// Used when staging data for a reduced-precision device.
pub fn round_through<F: Float>(value: f64) -> f64 {
    <F as NumCast>::from(value)
        .and_then(|v| v.to_f64())
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
#[path = "utils_test.rs"]
mod tests;
