use deltagraph_core::DeltaGraphError;

/// Indexed, fixed-length source of samples.
///
/// Implementations must be shareable across threads: a `PartitionedTrainable`
/// reads items from several rayon workers at once.
pub trait Dataset: Send + Sync {
    type Item: Send;

    /// Returns the item at `index`, or `IndexOutOfBounds` past the end.
    fn get(&self, index: usize) -> Result<Self::Item, DeltaGraphError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
