use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
use crate::error::DeltaGraphError;
use crate::id::{IdGenerator, LayerId};
use crate::layer::{
    check_arity, encode_record, reject_non_finite, required_input, Arity, Layer, LayerHeader, LayerRegistry,
    NumericPolicy, Parameter, SerialPrecision,
};
use crate::result::{Backward, LayerResult};
use crate::tensor::{Tensor, TensorList};
use log::debug;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Fully connected layer without bias: `y_j = Σ_i x_i · W[i, j]`.
///
/// Items are read as flat vectors of `inputs` elements and produce vectors of
/// `outputs` elements. The weight buffer has shape `[inputs, outputs]`.
#[derive(Debug)]
pub struct DenseLayer {
    header: LayerHeader,
    weights: Parameter,
}

#[derive(Serialize, Deserialize)]
struct DenseRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
    weights: Tensor,
}

impl DenseLayer {
    pub const CLASS: &'static str = "dense";

    /// Weights drawn from `N(0, 1/inputs)`.
    pub fn new<R: Rng + ?Sized>(ids: &IdGenerator, inputs: usize, outputs: usize, rng: &mut R) -> Result<Self, DeltaGraphError> {
        let std = (1.0 / inputs.max(1) as f64).sqrt();
        let weights = Tensor::randn(&[inputs, outputs], std, rng)?;
        Self::with_weights(ids.layer_id(), weights)
    }

    pub fn with_weights(id: LayerId, weights: Tensor) -> Result<Self, DeltaGraphError> {
        if weights.rank() != 2 {
            return Err(DeltaGraphError::Configuration(format!(
                "dense weights must be [inputs, outputs], got {:?}",
                weights.shape()
            )));
        }
        Ok(DenseLayer {
            header: LayerHeader::new(id, false),
            weights: Parameter::new(weights),
        })
    }

    pub fn weights(&self) -> &Parameter {
        &self.weights
    }

    pub fn from_json(value: &Value, _registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let record: DenseRecord = serde_json::from_value(value.clone())?;
        let layer = Self::with_weights(record.id, record.weights)?;
        layer.set_frozen(record.frozen);
        Ok(Arc::new(layer))
    }
}

impl Layer for DenseLayer {
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
        let weights = self.weights.snapshot();
        let (n_in, n_out) = (weights.shape()[0], weights.shape()[1]);
        let item_len: usize = input.data().item_shape().iter().product();
        if item_len != n_in {
            return Err(DeltaGraphError::ShapeMismatch {
                expected: vec![n_in],
                actual: input.data().item_shape().to_vec(),
                operation: format!("{} ({})", Self::CLASS, self.id()),
            });
        }
        let w = weights.data();
        let outputs = input
            .data()
            .as_slice()
            .par_iter()
            .map(|x| {
                let mut y = vec![0.0; n_out];
                for (i, &xi) in x.data().iter().enumerate() {
                    let row = &w[i * n_out..(i + 1) * n_out];
                    for (yj, wij) in y.iter_mut().zip(row.iter()) {
                        *yj += xi * wij;
                    }
                }
                Tensor::new(y, vec![n_out])
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LayerResult::new(
            TensorList::new(outputs)?,
            DenseBackward {
                layer: self.id(),
                frozen: self.is_frozen(),
                target: self.weights.clone(),
                weights,
                input: input.clone(),
            },
        ))
    }

    fn state(&self) -> Vec<Parameter> {
        vec![self.weights.clone()]
    }

    fn is_frozen(&self) -> bool {
        self.header.is_frozen()
    }

    fn set_frozen(&self, frozen: bool) {
        debug!("Dense layer {} frozen = {}", self.id(), frozen);
        self.header.set_frozen(frozen);
    }

    fn numeric_policy(&self) -> NumericPolicy {
        NumericPolicy::Reject
    }

    fn to_json(&self, precision: SerialPrecision) -> Result<Value, DeltaGraphError> {
        encode_record(
            Self::CLASS,
            &DenseRecord {
                id: self.id(),
                frozen: self.is_frozen(),
                weights: precision.apply(&self.weights.read()),
            },
        )
    }
}

#[derive(Debug)]
struct DenseBackward {
    layer: LayerId,
    frozen: bool,
    target: Parameter,
    /// Weights as they were during the forward pass.
    weights: Tensor,
    input: LayerResult,
}

impl Backward for DenseBackward {
    fn is_alive(&self) -> bool {
        !self.frozen || self.input.is_alive()
    }

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        let (n_in, n_out) = (self.weights.shape()[0], self.weights.shape()[1]);
        if !self.frozen {
            // dW[i, j] = Σ_b x_b[i] · g_b[j]
            let mut dw = vec![0.0; n_in * n_out];
            for (x, g) in self.input.data().iter().zip(gradient.iter()) {
                for (i, &xi) in x.data().iter().enumerate() {
                    for (j, &gj) in g.data().iter().enumerate() {
                        dw[i * n_out + j] += xi * gj;
                    }
                }
            }
            delta.accumulate(self.layer, 0, &self.target, &Tensor::new(dw, vec![n_in, n_out])?)?;
        }
        if self.input.is_alive() {
            let w = self.weights.data();
            let item_shape = self.input.data().item_shape().to_vec();
            let items = gradient
                .as_slice()
                .par_iter()
                .map(|g| {
                    let dx = (0..n_in)
                        .map(|i| {
                            w[i * n_out..(i + 1) * n_out]
                                .iter()
                                .zip(g.data().iter())
                                .map(|(wij, gj)| wij * gj)
                                .sum()
                        })
                        .collect();
                    Tensor::new(dx, item_shape.clone())
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.input.accumulate(ctx, delta, &TensorList::new(items)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "dense_test.rs"]
mod tests;
