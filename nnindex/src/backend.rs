use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMethod;
use crate::error::NnError;

/// Parameters for building a backend search structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Auto-tune index parameters during the build. When false,
    /// `target_precision` and `sample_fraction` are unused.
    pub autotune: bool,
    /// Target nearest-neighbor accuracy fraction in [0, 1] for auto-tuning.
    pub target_precision: f32,
    /// Fraction of the corpus in [0, 1] sampled during auto-tuning.
    pub sample_fraction: f32,
    /// Seed for reproducible builds.
    pub random_seed: Option<u64>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            autotune: false,
            target_precision: 0.95,
            sample_fraction: 0.1,
            random_seed: None,
        }
    }
}

/// The external nearest-neighbor search capability consumed by
/// [BackendNnIndex](crate::backend_index::BackendNnIndex).
///
/// Implementations typically wrap a native library. The handle returned by
/// [`build`](SearchBackend::build)/[`load`](SearchBackend::load) is valid
/// only in the process that created it; the owning index tracks process
/// identity and reloads through [`load`](SearchBackend::load) when crossing
/// a process boundary.
pub trait SearchBackend: Send + Sized {
    /// Achieved build parameters, fed back into every query. Opaque to the
    /// index beyond being persistable.
    type Params: Serialize + DeserializeOwned + Clone + Send;

    /// Whether the backing library is present and functional. Consult
    /// before constructing an index over this backend.
    fn is_usable() -> bool;

    /// Build a search structure over the row-major matrix.
    fn build(
        matrix: &[Vec<f32>],
        distance: DistanceMethod,
        opts: &BuildOptions,
    ) -> Result<(Self, Self::Params), NnError>;

    /// Persist the opaque search structure.
    fn save(&self, path: &Path) -> Result<(), NnError>;

    /// Restore a search structure persisted by [`save`](SearchBackend::save).
    /// `matrix` must be the same row-major matrix the structure was built
    /// over.
    fn load(
        path: &Path,
        matrix: &[Vec<f32>],
        distance: DistanceMethod,
        params: &Self::Params,
    ) -> Result<Self, NnError>;

    /// Return the `k` best rows for the query: row indices and their raw
    /// scores, in ascending score order. For distance metrics that is
    /// nearest first; for similarity metrics the nearest row comes last and
    /// the caller re-normalizes.
    ///
    /// The result is batched — one inner vector per query — even for a
    /// single query; callers flatten the first row.
    fn knn(
        &self,
        query: &[f32],
        k: usize,
        params: &Self::Params,
    ) -> Result<(Vec<Vec<usize>>, Vec<Vec<f32>>), NnError>;
}
