use percept_descriptor::Descriptor;

use crate::error::NnError;

/// NearestNeighborsIndex retrieves the k closest descriptors to a query
/// under a configured distance metric.
///
/// The index is built once over a corpus and queried repeatedly; rebuilding
/// replaces the contents wholesale, never appends. Implementations are not
/// internally parallel — callers serialize their own concurrent mutation.
pub trait NearestNeighborsIndex<D: Descriptor> {
    /// Number of indexed descriptors.
    fn count(&self) -> usize;

    /// Build the index over the given corpus, replacing any prior contents.
    /// Fails with [`NnError::EmptyCorpus`] when the corpus is empty.
    fn build_index(&mut self, corpus: Vec<D>) -> Result<(), NnError>;

    /// Return up to `n` nearest descriptors and their parallel distances,
    /// nearest first.
    ///
    /// Fails with [`NnError::EmptyQuery`] on an empty query vector and
    /// [`NnError::EmptyIndex`] when nothing has been indexed.
    fn nn(&mut self, d: &D, n: usize) -> Result<(Vec<D>, Vec<f32>), NnError>;
}
