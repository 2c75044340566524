use super::par_zip_items;
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
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Mean squared error between a prediction (slot 0) and a target (slot 1).
/// Produces one `[1]`-shaped loss per batch item.
#[derive(Debug)]
pub struct MeanSqLossLayer {
    header: LayerHeader,
}

#[derive(Serialize, Deserialize)]
struct MeanSqLossRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
}

impl MeanSqLossLayer {
    pub const CLASS: &'static str = "mean_sq_loss";

    pub fn new(ids: &IdGenerator) -> Self {
        Self::with_id(ids.layer_id())
    }

    pub fn with_id(id: LayerId) -> Self {
        MeanSqLossLayer {
            header: LayerHeader::new(id, false),
        }
    }

    pub fn from_json(value: &Value, _registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let record: MeanSqLossRecord = serde_json::from_value(value.clone())?;
        Ok(Arc::new(MeanSqLossLayer {
            header: LayerHeader::new(record.id, record.frozen),
        }))
    }
}

impl Layer for MeanSqLossLayer {
    fn id(&self) -> LayerId {
        self.header.id()
    }

    fn class(&self) -> &'static str {
        Self::CLASS
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn eval(&self, _ctx: &ExecutionContext, inputs: &[Option<LayerResult>]) -> Result<LayerResult, DeltaGraphError> {
        check_arity(self, inputs)?;
        let prediction = required_input(self, inputs, 0)?;
        let target = required_input(self, inputs, 1)?;
        common_batch_len(self, inputs)?;
        reject_non_finite(self, prediction.data())?;
        reject_non_finite(self, target.data())?;
        let residuals = par_zip_items(prediction.data(), target.data(), |p, t| p.zip_with(t, |a, b| a - b))?;
        let losses = residuals.map_items(|r| {
            let n = r.numel().max(1) as f64;
            Tensor::scalar(r.data().iter().map(|v| v * v).sum::<f64>() / n)
        });
        Ok(LayerResult::new(
            losses,
            MeanSqLossBackward {
                prediction: prediction.clone(),
                target: target.clone(),
                residuals,
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
            &MeanSqLossRecord {
                id: self.id(),
                frozen: self.is_frozen(),
            },
        )
    }
}

#[derive(Debug)]
struct MeanSqLossBackward {
    prediction: LayerResult,
    target: LayerResult,
    residuals: TensorList,
}

impl Backward for MeanSqLossBackward {
    fn is_alive(&self) -> bool {
        self.prediction.is_alive() || self.target.is_alive()
    }

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        // d/dp = g · 2 (p - t) / n
        let d_prediction = par_zip_items(&self.residuals, gradient, |r, g| {
            let scale = 2.0 * g.data()[0] / r.numel().max(1) as f64;
            Ok(r.scale(scale))
        })?;
        if self.prediction.is_alive() {
            self.prediction.accumulate(ctx, delta, &d_prediction)?;
        }
        if self.target.is_alive() {
            self.target.accumulate(ctx, delta, &d_prediction.scale(-1.0))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "loss_test.rs"]
mod tests;
