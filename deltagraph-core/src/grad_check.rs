//! Finite-difference verification of a layer's backward pass.

use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
use crate::error::DeltaGraphError;
use crate::id::LayerId;
use crate::layer::Layer;
use crate::result::LayerResult;
use crate::tensor::{Tensor, TensorList};
use log::debug;
use thiserror::Error;

/// Id under which input `i`'s gradient is collected. Chosen from the top of
/// the id space so it cannot collide with generated layer ids.
pub fn probe_id(input: usize) -> LayerId {
    LayerId(u64::MAX - input as u64)
}

/// Error type specifically for gradient checking failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("Gradient check failed for {target}, item {item}, element {element}: analytical {analytical} != numerical {numerical} (difference {difference})")]
    GradientMismatch {
        target: String,
        item: usize,
        element: usize,
        analytical: f64,
        numerical: f64,
        difference: f64,
    },

    #[error("Numerical gradient is not finite for {target}, element {element}: loss+ {loss_plus}, loss- {loss_minus}")]
    NumericalNotFinite {
        target: String,
        element: usize,
        loss_plus: f64,
        loss_minus: f64,
    },

    #[error("Frozen layer produced a delta for parameter slot {slot}")]
    FrozenLayerDelta { slot: usize },

    #[error("Layer failed during gradient check: {0}")]
    Layer(#[from] DeltaGraphError),
}

#[derive(Debug, Clone, Copy)]
pub struct GradCheckConfig {
    pub epsilon: f64,
    pub tolerance: f64,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        GradCheckConfig {
            epsilon: 1e-6,
            tolerance: 1e-4,
        }
    }
}

/// Summary of a passing check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckReport {
    pub elements_checked: usize,
    pub max_difference: f64,
}

/// Deterministic, non-uniform output weights. A uniform projection would hide
/// errors in layers whose outputs sum to a constant (softmax).
fn projection(output: &TensorList) -> Result<TensorList, DeltaGraphError> {
    let items = output
        .iter()
        .enumerate()
        .map(|(b, t)| {
            let data = (0..t.numel())
                .map(|k| 0.1 + ((b * 7 + k * 3) % 11) as f64 * 0.1)
                .collect();
            Tensor::new(data, t.shape().to_vec())
        })
        .collect::<Result<Vec<_>, _>>()?;
    TensorList::new(items)
}

fn weighted_sum(output: &TensorList, weights: &TensorList) -> Result<f64, DeltaGraphError> {
    output
        .iter()
        .zip(weights.iter())
        .map(|(o, w)| o.dot(w))
        .sum()
}

fn constant_inputs(inputs: &[TensorList]) -> Vec<Option<LayerResult>> {
    inputs.iter().cloned().map(LayerResult::constant).map(Some).collect()
}

struct Checker<'a> {
    layer: &'a dyn Layer,
    ctx: &'a ExecutionContext,
    weights: TensorList,
    config: GradCheckConfig,
    report: GradCheckReport,
}

impl Checker<'_> {
    fn loss(&self, inputs: &[TensorList]) -> Result<f64, DeltaGraphError> {
        let out = self.layer.eval(self.ctx, &constant_inputs(inputs))?;
        weighted_sum(out.data(), &self.weights)
    }

    fn compare(&mut self, target: &str, item: usize, element: usize, analytical: f64, numerical: f64) -> Result<(), GradCheckError> {
        let difference = (analytical - numerical).abs();
        let scale = 1.0_f64.max(analytical.abs()).max(numerical.abs());
        self.report.elements_checked += 1;
        self.report.max_difference = self.report.max_difference.max(difference);
        if difference > self.config.tolerance * scale {
            return Err(GradCheckError::GradientMismatch {
                target: target.to_string(),
                item,
                element,
                analytical,
                numerical,
                difference,
            });
        }
        Ok(())
    }

    fn central_difference<F>(&self, target: &str, element: usize, mut loss_at: F) -> Result<f64, GradCheckError>
    where
        F: FnMut(f64) -> Result<f64, DeltaGraphError>,
    {
        let eps = self.config.epsilon;
        let loss_plus = loss_at(eps)?;
        let loss_minus = loss_at(-eps)?;
        let numerical = (loss_plus - loss_minus) / (2.0 * eps);
        if !numerical.is_finite() {
            return Err(GradCheckError::NumericalNotFinite {
                target: target.to_string(),
                element,
                loss_plus,
                loss_minus,
            });
        }
        Ok(numerical)
    }
}

/// Compares the layer's analytical gradients (for every input and every
/// parameter buffer) with centered finite differences of
/// `L = Σ w · layer(inputs)` for a fixed projection `w`.
///
/// Frozen layers must produce no parameter deltas; their input gradients are
/// still checked.
pub fn check_layer_gradients(
    layer: &dyn Layer,
    ctx: &ExecutionContext,
    inputs: &[TensorList],
    config: GradCheckConfig,
) -> Result<GradCheckReport, GradCheckError> {
    let tracked: Vec<Option<LayerResult>> = inputs
        .iter()
        .enumerate()
        .map(|(i, list)| Some(LayerResult::tracked(list.clone(), probe_id(i))))
        .collect();
    let output = layer.eval(ctx, &tracked)?;
    let weights = projection(output.data())?;
    let mut delta = DeltaSet::new();
    output.accumulate(ctx, &mut delta, &weights)?;

    let mut checker = Checker {
        layer,
        ctx,
        weights,
        config,
        report: GradCheckReport {
            elements_checked: 0,
            max_difference: 0.0,
        },
    };

    for (i, list) in inputs.iter().enumerate() {
        let target = format!("input {}", i);
        for (item, tensor) in list.iter().enumerate() {
            let analytical = delta
                .get(probe_id(i), item)
                .cloned()
                .unwrap_or_else(|| tensor.zeros_like());
            for element in 0..tensor.numel() {
                let numerical = checker.central_difference(&target, element, |offset| {
                    let mut items = list.as_slice().to_vec();
                    items[item].data_mut()[element] += offset;
                    let mut perturbed = inputs.to_vec();
                    perturbed[i] = TensorList::new(items)?;
                    checker.loss(&perturbed)
                })?;
                checker.compare(&target, item, element, analytical.data()[element], numerical)?;
            }
        }
    }

    let state = layer.state();
    if layer.is_frozen() {
        if let Some(slot) = (0..state.len()).find(|&s| delta.get(layer.id(), s).is_some()) {
            return Err(GradCheckError::FrozenLayerDelta { slot });
        }
    } else {
        for (slot, param) in state.iter().enumerate() {
            let target = format!("parameter slot {}", slot);
            let original = param.snapshot();
            let analytical = delta
                .get(layer.id(), slot)
                .cloned()
                .unwrap_or_else(|| original.zeros_like());
            for element in 0..original.numel() {
                let numerical = checker.central_difference(&target, element, |offset| {
                    let mut perturbed = original.clone();
                    perturbed.data_mut()[element] += offset;
                    param.assign(perturbed);
                    let loss = checker.loss(inputs);
                    param.assign(original.clone());
                    loss
                });
                param.assign(original.clone());
                checker.compare(&target, 0, element, analytical.data()[element], numerical?)?;
            }
        }
    }

    debug!(
        "Gradient check of {} ({}) passed: {} element(s), max difference {:e}",
        layer.class(),
        layer.id(),
        checker.report.elements_checked,
        checker.report.max_difference
    );
    Ok(checker.report)
}

#[cfg(test)]
#[path = "grad_check_test.rs"]
mod tests;
