use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
use crate::error::DeltaGraphError;
use crate::id::{IdGenerator, LayerId};
use crate::layer::{
    check_arity, encode_record, reject_non_finite, required_input, Arity, Layer, LayerHeader, LayerRegistry,
    NumericPolicy, SerialPrecision,
};
use crate::result::{Backward, LayerResult};
use crate::tensor::utils::{index_to_coord, offset_of};
use crate::tensor::{Tensor, TensorList};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Non-overlapping windowed maximum.
///
/// Each item is tiled by `window` (one extent per axis, stride equal to the
/// extent; edge windows may be partial). Within a window the maximum is found
/// by a sequential row-major scan and the first maximal element wins ties.
/// The gradient of an output element goes entirely to that element.
#[derive(Debug)]
pub struct MaxPoolLayer {
    header: LayerHeader,
    window: Vec<usize>,
}

#[derive(Serialize, Deserialize)]
struct MaxPoolRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
    window: Vec<usize>,
}

impl MaxPoolLayer {
    pub const CLASS: &'static str = "max_pool";

    pub fn new(ids: &IdGenerator, window: Vec<usize>) -> Result<Self, DeltaGraphError> {
        Self::with_id(ids.layer_id(), window)
    }

    pub fn with_id(id: LayerId, window: Vec<usize>) -> Result<Self, DeltaGraphError> {
        if window.is_empty() || window.contains(&0) {
            return Err(DeltaGraphError::Configuration(format!(
                "max pool window {:?} must be non-empty with positive extents",
                window
            )));
        }
        Ok(MaxPoolLayer {
            header: LayerHeader::new(id, false),
            window,
        })
    }

    pub fn window(&self) -> &[usize] {
        &self.window
    }

    pub fn from_json(value: &Value, _registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let record: MaxPoolRecord = serde_json::from_value(value.clone())?;
        let layer = Self::with_id(record.id, record.window)?;
        layer.set_frozen(record.frozen);
        Ok(Arc::new(layer))
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, DeltaGraphError> {
        if input.len() != self.window.len() {
            return Err(DeltaGraphError::ShapeMismatch {
                expected: self.window.clone(),
                actual: input.to_vec(),
                operation: format!("{} window rank", Self::CLASS),
            });
        }
        Ok(input
            .iter()
            .zip(self.window.iter())
            .map(|(d, w)| (d + w - 1) / w)
            .collect())
    }

    /// Returns the pooled item and, per output element, the flat input
    /// offset that won.
    fn pool_item(&self, x: &Tensor) -> Result<(Tensor, Vec<usize>), DeltaGraphError> {
        let out_shape = self.output_shape(x.shape())?;
        let out_len: usize = out_shape.iter().product();
        let mut values = Vec::with_capacity(out_len);
        let mut argmax = Vec::with_capacity(out_len);
        for o in 0..out_len {
            let out_coord = index_to_coord(o, &out_shape);
            let origin: Vec<usize> = out_coord.iter().zip(self.window.iter()).map(|(c, w)| c * w).collect();
            let extent: Vec<usize> = origin
                .iter()
                .zip(self.window.iter())
                .zip(x.shape().iter())
                .map(|((start, w), d)| (*w).min(d - start))
                .collect();
            let window_len: usize = extent.iter().product();
            let mut best: Option<(usize, f64)> = None;
            for k in 0..window_len {
                let local = index_to_coord(k, &extent);
                let coord: Vec<usize> = origin.iter().zip(local.iter()).map(|(a, b)| a + b).collect();
                let offset = offset_of(&coord, x.shape())?;
                let v = x.data()[offset];
                match best {
                    Some((_, bv)) if v <= bv => {}
                    _ => best = Some((offset, v)),
                }
            }
            let (offset, v) = best.ok_or_else(|| DeltaGraphError::Configuration("empty pooling window".to_string()))?;
            values.push(v);
            argmax.push(offset);
        }
        Ok((Tensor::new(values, out_shape)?, argmax))
    }
}

impl Layer for MaxPoolLayer {
    fn id(&self) -> LayerId {
        self.header.id()
    }

    fn class(&self) -> &'static str {
        Self::CLASS
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn eval(&self, _ctx: &ExecutionContext, inputs: &[Option<LayerResult>]) -> Result<LayerResult, DeltaGraphError> {
        check_arity(self, inputs)?;
        let input = required_input(self, inputs, 0)?;
        reject_non_finite(self, input.data())?;
        let pooled = input
            .data()
            .as_slice()
            .par_iter()
            .map(|x| self.pool_item(x))
            .collect::<Result<Vec<_>, _>>()?;
        let (outputs, argmax): (Vec<Tensor>, Vec<Vec<usize>>) = pooled.into_iter().unzip();
        Ok(LayerResult::new(
            TensorList::new(outputs)?,
            MaxPoolBackward {
                input: input.clone(),
                argmax,
            },
        ))
    }

    fn is_frozen(&self) -> bool {
        self.header.is_frozen()
    }

    fn set_frozen(&self, frozen: bool) {
        self.header.set_frozen(frozen);
    }

    fn numeric_policy(&self) -> NumericPolicy {
        NumericPolicy::Reject
    }

    fn to_json(&self, _precision: SerialPrecision) -> Result<Value, DeltaGraphError> {
        encode_record(
            Self::CLASS,
            &MaxPoolRecord {
                id: self.id(),
                frozen: self.is_frozen(),
                window: self.window.clone(),
            },
        )
    }
}

#[derive(Debug)]
struct MaxPoolBackward {
    input: LayerResult,
    argmax: Vec<Vec<usize>>,
}

impl Backward for MaxPoolBackward {
    fn is_alive(&self) -> bool {
        self.input.is_alive()
    }

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        // Route each output gradient to its recorded winner.
        let items = self
            .input
            .data()
            .iter()
            .zip(gradient.iter())
            .zip(self.argmax.iter())
            .map(|((x, g), winners)| {
                let mut grad = x.zeros_like();
                for (o, &offset) in winners.iter().enumerate() {
                    grad.data_mut()[offset] += g.data()[o];
                }
                grad
            })
            .collect();
        self.input.accumulate(ctx, delta, &TensorList::new(items)?)
    }
}

#[cfg(test)]
#[path = "max_pool_test.rs"]
mod tests;
