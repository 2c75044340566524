use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
use crate::error::DeltaGraphError;
use crate::id::{IdGenerator, LayerId};
use crate::layer::{
    check_arity, encode_record, required_input, Arity, Layer, LayerHeader, LayerRegistry, NumericPolicy,
    SerialPrecision,
};
use crate::result::{Backward, LayerResult};
use crate::tensor::{Tensor, TensorList};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Softmax over the last axis of every batch item.
///
/// Non-finite inputs are replaced by 0 before exponentiation; those
/// positions receive no input gradient.
#[derive(Debug)]
pub struct SoftmaxLayer {
    header: LayerHeader,
}

#[derive(Serialize, Deserialize)]
struct SoftmaxRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
}

/// Forward intermediates of one batch item.
#[derive(Debug)]
struct SoftmaxItem {
    exps: Tensor,
    sums: Vec<f64>,
    sanitized: Vec<usize>,
}

fn row_len(shape: &[usize]) -> usize {
    shape.last().copied().unwrap_or(1).max(1)
}

fn softmax_item(x: &Tensor) -> Result<SoftmaxItem, DeltaGraphError> {
    let row = row_len(x.shape());
    let mut sanitized = Vec::new();
    let clean: Vec<f64> = x
        .data()
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if v.is_finite() {
                v
            } else {
                sanitized.push(i);
                0.0
            }
        })
        .collect();
    let mut exps = Vec::with_capacity(clean.len());
    let mut sums = Vec::with_capacity(clean.len() / row);
    for chunk in clean.chunks(row) {
        let max = chunk.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let start = exps.len();
        exps.extend(chunk.iter().map(|v| (v - max).exp()));
        sums.push(exps[start..].iter().sum());
    }
    Ok(SoftmaxItem {
        exps: Tensor::new(exps, x.shape().to_vec())?,
        sums,
        sanitized,
    })
}

impl SoftmaxLayer {
    pub const CLASS: &'static str = "softmax";

    pub fn new(ids: &IdGenerator) -> Self {
        Self::with_id(ids.layer_id())
    }

    pub fn with_id(id: LayerId) -> Self {
        SoftmaxLayer {
            header: LayerHeader::new(id, false),
        }
    }

    pub fn from_json(value: &Value, _registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let record: SoftmaxRecord = serde_json::from_value(value.clone())?;
        Ok(Arc::new(SoftmaxLayer {
            header: LayerHeader::new(record.id, record.frozen),
        }))
    }
}

impl Layer for SoftmaxLayer {
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
        let items = input
            .data()
            .as_slice()
            .par_iter()
            .map(softmax_item)
            .collect::<Result<Vec<_>, _>>()?;
        let replaced: usize = items.iter().map(|i| i.sanitized.len()).sum();
        if replaced > 0 {
            debug!("Softmax {} replaced {} non-finite input value(s) with 0", self.id(), replaced);
        }
        let outputs = items
            .iter()
            .map(|item| {
                let row = row_len(item.exps.shape());
                let data = item
                    .exps
                    .data()
                    .chunks(row)
                    .zip(item.sums.iter())
                    .flat_map(|(chunk, sum)| chunk.iter().map(move |e| e / sum))
                    .collect();
                Tensor::new(data, item.exps.shape().to_vec())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LayerResult::new(
            TensorList::new(outputs)?,
            SoftmaxBackward {
                input: input.clone(),
                items,
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
        NumericPolicy::Sanitize
    }

    fn to_json(&self, _precision: SerialPrecision) -> Result<Value, DeltaGraphError> {
        encode_record(
            Self::CLASS,
            &SoftmaxRecord {
                id: self.id(),
                frozen: self.is_frozen(),
            },
        )
    }
}

#[derive(Debug)]
struct SoftmaxBackward {
    input: LayerResult,
    items: Vec<SoftmaxItem>,
}

impl Backward for SoftmaxBackward {
    fn is_alive(&self) -> bool {
        self.input.is_alive()
    }

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        // dx_i = ((sum * g_i - sum_j g_j * exp_j) * exp_i) / sum^2
        let items = (0..gradient.len())
            .into_par_iter()
            .map(|b| {
                let item = &self.items[b];
                let g = &gradient.as_slice()[b];
                let row = row_len(g.shape());
                let mut out = Vec::with_capacity(g.numel());
                for ((g_row, e_row), &sum) in g.data().chunks(row).zip(item.exps.data().chunks(row)).zip(item.sums.iter()) {
                    let dot: f64 = g_row.iter().zip(e_row.iter()).map(|(g, e)| g * e).sum();
                    out.extend(
                        g_row
                            .iter()
                            .zip(e_row.iter())
                            .map(|(g, e)| (sum * g - dot) * e / (sum * sum)),
                    );
                }
                for &i in &item.sanitized {
                    out[i] = 0.0;
                }
                Tensor::new(out, g.shape().to_vec())
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.input.accumulate(ctx, delta, &TensorList::new(items)?)
    }
}

#[cfg(test)]
#[path = "softmax_test.rs"]
mod tests;
