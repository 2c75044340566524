use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
use crate::error::DeltaGraphError;
use crate::id::{IdGenerator, LayerId};
use crate::layer::{
    check_arity, common_batch_len, encode_record, reject_non_finite, Arity, Layer, LayerHeader, LayerRegistry,
    NumericPolicy, SerialPrecision,
};
use crate::result::{Backward, LayerResult};
use crate::tensor::TensorList;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Item-wise sum of its inputs. Any slot may be left unconnected; absent
/// inputs contribute nothing, but at least one input must be present.
#[derive(Debug)]
pub struct SumInputsLayer {
    header: LayerHeader,
}

#[derive(Serialize, Deserialize)]
struct SumInputsRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
}

impl SumInputsLayer {
    pub const CLASS: &'static str = "sum_inputs";

    pub fn new(ids: &IdGenerator) -> Self {
        Self::with_id(ids.layer_id())
    }

    pub fn with_id(id: LayerId) -> Self {
        SumInputsLayer {
            header: LayerHeader::new(id, false),
        }
    }

    pub fn from_json(value: &Value, _registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let record: SumInputsRecord = serde_json::from_value(value.clone())?;
        Ok(Arc::new(SumInputsLayer {
            header: LayerHeader::new(record.id, record.frozen),
        }))
    }
}

impl Layer for SumInputsLayer {
    fn id(&self) -> LayerId {
        self.header.id()
    }

    fn class(&self) -> &'static str {
        Self::CLASS
    }

    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }

    fn accepts_missing(&self, _slot: usize) -> bool {
        true
    }

    fn eval(&self, _ctx: &ExecutionContext, inputs: &[Option<LayerResult>]) -> Result<LayerResult, DeltaGraphError> {
        check_arity(self, inputs)?;
        common_batch_len(self, inputs)?;
        let present: Vec<LayerResult> = inputs.iter().flatten().cloned().collect();
        let mut total = present[0].data().clone();
        reject_non_finite(self, &total)?;
        for input in &present[1..] {
            reject_non_finite(self, input.data())?;
            total = total.add(input.data())?;
        }
        Ok(LayerResult::new(total, SumInputsBackward { inputs: present }))
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
            &SumInputsRecord {
                id: self.id(),
                frozen: self.is_frozen(),
            },
        )
    }
}

#[derive(Debug)]
struct SumInputsBackward {
    inputs: Vec<LayerResult>,
}

impl Backward for SumInputsBackward {
    fn is_alive(&self) -> bool {
        self.inputs.iter().any(LayerResult::is_alive)
    }

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        for input in self.inputs.iter().filter(|i| i.is_alive()) {
            input.accumulate(ctx, delta, gradient)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "sum_inputs_test.rs"]
mod tests;
