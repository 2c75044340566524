use super::par_map_items;
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
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Adds a learned tensor of the item shape to every item.
#[derive(Debug)]
pub struct BiasLayer {
    header: LayerHeader,
    bias: Parameter,
}

#[derive(Serialize, Deserialize)]
struct BiasRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
    bias: Tensor,
}

impl BiasLayer {
    pub const CLASS: &'static str = "bias";

    /// Zero-initialized bias of `shape`.
    pub fn new(ids: &IdGenerator, shape: &[usize]) -> Self {
        Self::with_bias(ids.layer_id(), Tensor::zeros(shape))
    }

    pub fn with_bias(id: LayerId, bias: Tensor) -> Self {
        BiasLayer {
            header: LayerHeader::new(id, false),
            bias: Parameter::new(bias),
        }
    }

    pub fn bias(&self) -> &Parameter {
        &self.bias
    }

    pub fn from_json(value: &Value, _registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let record: BiasRecord = serde_json::from_value(value.clone())?;
        let layer = Self::with_bias(record.id, record.bias);
        layer.set_frozen(record.frozen);
        Ok(Arc::new(layer))
    }
}

impl Layer for BiasLayer {
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
        let bias = self.bias.snapshot();
        let output = par_map_items(input.data(), |x| x.add(&bias))?;
        Ok(LayerResult::new(
            output,
            BiasBackward {
                layer: self.id(),
                frozen: self.is_frozen(),
                target: self.bias.clone(),
                input: input.clone(),
            },
        ))
    }

    fn state(&self) -> Vec<Parameter> {
        vec![self.bias.clone()]
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

    fn to_json(&self, precision: SerialPrecision) -> Result<Value, DeltaGraphError> {
        encode_record(
            Self::CLASS,
            &BiasRecord {
                id: self.id(),
                frozen: self.is_frozen(),
                bias: precision.apply(&self.bias.read()),
            },
        )
    }
}

#[derive(Debug)]
struct BiasBackward {
    layer: LayerId,
    frozen: bool,
    target: Parameter,
    input: LayerResult,
}

impl Backward for BiasBackward {
    fn is_alive(&self) -> bool {
        !self.frozen || self.input.is_alive()
    }

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        if !self.frozen {
            let mut sum = Tensor::zeros(gradient.item_shape());
            for g in gradient.iter() {
                sum.add_assign(g)?;
            }
            delta.accumulate(self.layer, 0, &self.target, &sum)?;
        }
        if self.input.is_alive() {
            self.input.accumulate(ctx, delta, gradient)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "bias_test.rs"]
mod tests;
