use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
use crate::error::DeltaGraphError;
use crate::id::{IdGenerator, LayerId};
use crate::layer::{
    check_arity, encode_record, required_input, Arity, Layer, LayerHeader, LayerRegistry, NumericPolicy,
    SerialPrecision,
};
use crate::result::{Backward, LayerResult};
use crate::tensor::TensorList;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Identity layer that counts its forward and backward invocations.
///
/// Useful to observe how often a node is evaluated; the counters are not
/// serialized.
#[derive(Debug)]
pub struct ProbeLayer {
    header: LayerHeader,
    counters: Arc<ProbeCounters>,
}

#[derive(Debug, Default)]
struct ProbeCounters {
    forward: AtomicUsize,
    backward: AtomicUsize,
}

#[derive(Serialize, Deserialize)]
struct ProbeRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
}

impl ProbeLayer {
    pub const CLASS: &'static str = "probe";

    pub fn new(ids: &IdGenerator) -> Self {
        Self::with_id(ids.layer_id())
    }

    pub fn with_id(id: LayerId) -> Self {
        ProbeLayer {
            header: LayerHeader::new(id, false),
            counters: Arc::new(ProbeCounters::default()),
        }
    }

    pub fn evaluations(&self) -> usize {
        self.counters.forward.load(Ordering::SeqCst)
    }

    pub fn backward_calls(&self) -> usize {
        self.counters.backward.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.counters.forward.store(0, Ordering::SeqCst);
        self.counters.backward.store(0, Ordering::SeqCst);
    }

    pub fn from_json(value: &Value, _registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let record: ProbeRecord = serde_json::from_value(value.clone())?;
        let layer = Self::with_id(record.id);
        layer.set_frozen(record.frozen);
        Ok(Arc::new(layer))
    }
}

impl Layer for ProbeLayer {
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
        self.counters.forward.fetch_add(1, Ordering::SeqCst);
        Ok(LayerResult::new(
            input.data().clone(),
            ProbeBackward {
                input: input.clone(),
                counters: Arc::clone(&self.counters),
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
        // No arithmetic: non-finite values reach the consumer unchanged.
        NumericPolicy::Sanitize
    }

    fn to_json(&self, _precision: SerialPrecision) -> Result<Value, DeltaGraphError> {
        encode_record(
            Self::CLASS,
            &ProbeRecord {
                id: self.id(),
                frozen: self.is_frozen(),
            },
        )
    }
}

#[derive(Debug)]
struct ProbeBackward {
    input: LayerResult,
    counters: Arc<ProbeCounters>,
}

impl Backward for ProbeBackward {
    fn is_alive(&self) -> bool {
        self.input.is_alive()
    }

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        self.counters.backward.fetch_add(1, Ordering::SeqCst);
        self.input.accumulate(ctx, delta, gradient)
    }
}
