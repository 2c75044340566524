use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
use crate::error::DeltaGraphError;
use crate::id::{IdGenerator, LayerId};
use crate::layer::{
    check_arity, common_batch_len, encode_record, reject_non_finite, required_input, Arity, Layer, LayerHeader,
    LayerRegistry, NumericPolicy, SerialPrecision,
};
use crate::result::{Backward, LayerResult};
use crate::tensor::{Tensor, TensorList};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Element-wise maximum across several same-shaped inputs.
///
/// For each element, inputs are scanned in slot order and the first maximal
/// one wins. The whole gradient of an element is routed to the winning input.
#[derive(Debug)]
pub struct MaxInputsLayer {
    header: LayerHeader,
}

#[derive(Serialize, Deserialize)]
struct MaxInputsRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
}

impl MaxInputsLayer {
    pub const CLASS: &'static str = "max_inputs";

    pub fn new(ids: &IdGenerator) -> Self {
        Self::with_id(ids.layer_id())
    }

    pub fn with_id(id: LayerId) -> Self {
        MaxInputsLayer {
            header: LayerHeader::new(id, false),
        }
    }

    pub fn from_json(value: &Value, _registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let record: MaxInputsRecord = serde_json::from_value(value.clone())?;
        Ok(Arc::new(MaxInputsLayer {
            header: LayerHeader::new(record.id, record.frozen),
        }))
    }
}

impl Layer for MaxInputsLayer {
    fn id(&self) -> LayerId {
        self.header.id()
    }

    fn class(&self) -> &'static str {
        Self::CLASS
    }

    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }

    fn eval(&self, _ctx: &ExecutionContext, inputs: &[Option<LayerResult>]) -> Result<LayerResult, DeltaGraphError> {
        check_arity(self, inputs)?;
        let present = (0..inputs.len())
            .map(|slot| required_input(self, inputs, slot).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let batch = common_batch_len(self, inputs)?;
        for input in &present {
            reject_non_finite(self, input.data())?;
            if input.data().item_shape() != present[0].data().item_shape() {
                return Err(DeltaGraphError::ShapeMismatch {
                    expected: present[0].data().item_shape().to_vec(),
                    actual: input.data().item_shape().to_vec(),
                    operation: format!("{} ({})", Self::CLASS, self.id()),
                });
            }
        }
        let selected = (0..batch)
            .into_par_iter()
            .map(|b| {
                let first = &present[0].data().as_slice()[b];
                let mut values = first.data().to_vec();
                let mut winners = vec![0usize; values.len()];
                for (slot, input) in present.iter().enumerate().skip(1) {
                    let x = &input.data().as_slice()[b];
                    for (k, &v) in x.data().iter().enumerate() {
                        if v > values[k] {
                            values[k] = v;
                            winners[k] = slot;
                        }
                    }
                }
                Ok((Tensor::new(values, first.shape().to_vec())?, winners))
            })
            .collect::<Result<Vec<_>, DeltaGraphError>>()?;
        let (outputs, winners): (Vec<Tensor>, Vec<Vec<usize>>) = selected.into_iter().unzip();
        Ok(LayerResult::new(
            TensorList::new(outputs)?,
            MaxInputsBackward {
                inputs: present,
                winners,
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
            &MaxInputsRecord {
                id: self.id(),
                frozen: self.is_frozen(),
            },
        )
    }
}

#[derive(Debug)]
struct MaxInputsBackward {
    inputs: Vec<LayerResult>,
    winners: Vec<Vec<usize>>,
}

impl Backward for MaxInputsBackward {
    fn is_alive(&self) -> bool {
        self.inputs.iter().any(LayerResult::is_alive)
    }

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        for (slot, input) in self.inputs.iter().enumerate() {
            if !input.is_alive() {
                continue;
            }
            let items = gradient
                .iter()
                .zip(self.winners.iter())
                .map(|(g, winners)| {
                    g.data()
                        .iter()
                        .zip(winners.iter())
                        .map(|(&gv, &w)| if w == slot { gv } else { 0.0 })
                        .collect::<Vec<_>>()
                })
                .map(|data| Tensor::new(data, gradient.item_shape().to_vec()))
                .collect::<Result<Vec<_>, _>>()?;
            input.accumulate(ctx, delta, &TensorList::new(items)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "max_inputs_test.rs"]
mod tests;
