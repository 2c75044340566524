use super::{par_map_items, par_zip_items};
use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
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

/// Element-wise absolute value. The subgradient at 0 is taken as +1.
#[derive(Debug)]
pub struct AbsLayer {
    header: LayerHeader,
}

#[derive(Serialize, Deserialize)]
struct AbsRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
}

impl AbsLayer {
    pub const CLASS: &'static str = "abs";

    pub fn new(ids: &IdGenerator) -> Self {
        Self::with_id(ids.layer_id())
    }

    pub fn with_id(id: LayerId) -> Self {
        AbsLayer {
            header: LayerHeader::new(id, false),
        }
    }

    pub fn from_json(value: &Value, _registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let record: AbsRecord = serde_json::from_value(value.clone())?;
        Ok(Arc::new(AbsLayer {
            header: LayerHeader::new(record.id, record.frozen),
        }))
    }
}

impl Layer for AbsLayer {
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
        let output = par_map_items(input.data(), |t| Ok(t.map(f64::abs)))?;
        Ok(LayerResult::new(output, AbsBackward { input: input.clone() }))
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
            &AbsRecord {
                id: self.id(),
                frozen: self.is_frozen(),
            },
        )
    }
}

#[derive(Debug)]
struct AbsBackward {
    input: LayerResult,
}

impl Backward for AbsBackward {
    fn is_alive(&self) -> bool {
        self.input.is_alive()
    }

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        let input_grad = par_zip_items(self.input.data(), gradient, |x, g| {
            x.zip_with(g, |v, gv| if v < 0.0 { -gv } else { gv })
        })?;
        self.input.accumulate(ctx, delta, &input_grad)
    }
}

#[cfg(test)]
#[path = "abs_test.rs"]
mod tests;
