use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
use crate::device::{DeviceScope, ElementwiseOp, Kernel};
use crate::error::DeltaGraphError;
use crate::id::{IdGenerator, LayerId};
use crate::layer::{
    check_arity, encode_record, reject_non_finite, required_input, Arity, Layer, LayerHeader, LayerRegistry,
    NumericPolicy, SerialPrecision,
};
use crate::result::{Backward, LayerResult};
use crate::tensor::TensorList;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Element-wise activation computed on the context's device.
///
/// Forward and backward each open their own [`DeviceScope`]; the device
/// named by the context of *that* call is used, so a backward pass may run on
/// a different thread or device than its forward pass.
#[derive(Debug)]
pub struct ActivationLayer {
    header: LayerHeader,
    mode: ElementwiseOp,
}

#[derive(Serialize, Deserialize)]
struct ActivationRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
    mode: ElementwiseOp,
}

impl ActivationLayer {
    pub const CLASS: &'static str = "activation";

    pub fn new(ids: &IdGenerator, mode: ElementwiseOp) -> Self {
        Self::with_id(ids.layer_id(), mode)
    }

    pub fn with_id(id: LayerId, mode: ElementwiseOp) -> Self {
        ActivationLayer {
            header: LayerHeader::new(id, false),
            mode,
        }
    }

    pub fn mode(&self) -> ElementwiseOp {
        self.mode
    }

    pub fn from_json(value: &Value, _registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let record: ActivationRecord = serde_json::from_value(value.clone())?;
        let layer = Self::with_id(record.id, record.mode);
        layer.set_frozen(record.frozen);
        Ok(Arc::new(layer))
    }
}

impl Layer for ActivationLayer {
    fn id(&self) -> LayerId {
        self.header.id()
    }

    fn class(&self) -> &'static str {
        Self::CLASS
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn eval(&self, ctx: &ExecutionContext, inputs: &[Option<LayerResult>]) -> Result<LayerResult, DeltaGraphError> {
        check_arity(self, inputs)?;
        let input = required_input(self, inputs, 0)?;
        reject_non_finite(self, input.data())?;
        let output = {
            let mut scope = DeviceScope::open(ctx, format!("{}_forward", self.mode.name()))?;
            let x = scope.stage(input.data())?;
            let y = scope.alloc(x.shape())?;
            scope.launch(Kernel::Forward(self.mode), &[&x], &y)?;
            scope.fetch(&y)?
        };
        Ok(LayerResult::new(
            output,
            ActivationBackward {
                mode: self.mode,
                input: input.clone(),
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
            &ActivationRecord {
                id: self.id(),
                frozen: self.is_frozen(),
                mode: self.mode,
            },
        )
    }
}

#[derive(Debug)]
struct ActivationBackward {
    mode: ElementwiseOp,
    input: LayerResult,
}

impl Backward for ActivationBackward {
    fn is_alive(&self) -> bool {
        self.input.is_alive()
    }

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        let input_grad = {
            let mut scope = DeviceScope::open(ctx, format!("{}_backward", self.mode.name()))?;
            let x = scope.stage(self.input.data())?;
            let g = scope.stage(gradient)?;
            let dx = scope.alloc(x.shape())?;
            scope.launch(Kernel::Backward(self.mode), &[&x, &g], &dx)?;
            scope.fetch(&dx)?
        };
        // Device buffers are released before recursing into the inputs.
        self.input.accumulate(ctx, delta, &input_grad)
    }
}

#[cfg(test)]
#[path = "activation_test.rs"]
mod tests;
