//! Directed acyclic networks of layers.

pub mod cache;
pub mod network;
pub mod node;
pub mod serial;

pub use cache::EvaluationCache;
pub use network::DagNetwork;
pub use node::{Node, NodeHandle, NodeKind};
