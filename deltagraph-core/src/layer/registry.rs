use super::Layer;
use crate::error::DeltaGraphError;
use crate::graph::DagNetwork;
use crate::layers::{
    AbsLayer, ActivationLayer, BiasLayer, DenseLayer, MaxInputsLayer, MaxPoolLayer, MeanSqLossLayer, ProbeLayer,
    SoftmaxLayer, SumInputsLayer,
};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Rebuilds a layer from its JSON record. Receives the registry so container
/// layers can decode their children.
pub type LayerConstructor = fn(&Value, &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError>;

/// Maps a layer's `class` discriminator to its constructor.
#[derive(Clone)]
pub struct LayerRegistry {
    constructors: HashMap<String, LayerConstructor>,
}

impl LayerRegistry {
    /// A registry with no classes.
    pub fn empty() -> Self {
        LayerRegistry {
            constructors: HashMap::new(),
        }
    }

    /// A registry that knows every layer shipped with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(AbsLayer::CLASS, AbsLayer::from_json);
        registry.register(SoftmaxLayer::CLASS, SoftmaxLayer::from_json);
        registry.register(MaxPoolLayer::CLASS, MaxPoolLayer::from_json);
        registry.register(MaxInputsLayer::CLASS, MaxInputsLayer::from_json);
        registry.register(DenseLayer::CLASS, DenseLayer::from_json);
        registry.register(BiasLayer::CLASS, BiasLayer::from_json);
        registry.register(ActivationLayer::CLASS, ActivationLayer::from_json);
        registry.register(SumInputsLayer::CLASS, SumInputsLayer::from_json);
        registry.register(MeanSqLossLayer::CLASS, MeanSqLossLayer::from_json);
        registry.register(ProbeLayer::CLASS, ProbeLayer::from_json);
        registry.register(DagNetwork::CLASS, DagNetwork::from_json_layer);
        registry
    }

    /// Adds or replaces the constructor for `class`.
    pub fn register(&mut self, class: &str, constructor: LayerConstructor) {
        if self.constructors.insert(class.to_string(), constructor).is_some() {
            debug!("Replaced constructor for layer class '{}'", class);
        }
    }

    pub fn contains(&self, class: &str) -> bool {
        self.constructors.contains_key(class)
    }

    /// Decodes one layer record, dispatching on its `class` field.
    pub fn decode(&self, value: &Value) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let class = value
            .get("class")
            .and_then(Value::as_str)
            .ok_or_else(|| DeltaGraphError::Serialization("layer record has no 'class' field".to_string()))?;
        let constructor = self
            .constructors
            .get(class)
            .ok_or_else(|| DeltaGraphError::UnknownLayerClass(class.to_string()))?;
        constructor(value, self)
    }

    pub fn decode_str(&self, json: &str) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        let value: Value = serde_json::from_str(json)?;
        self.decode(&value)
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<&String> = self.constructors.keys().collect();
        classes.sort();
        f.debug_struct("LayerRegistry").field("classes", &classes).finish()
    }
}
