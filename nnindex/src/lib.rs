pub mod backend;
pub mod backend_index;
pub mod distance;
pub mod error;
pub mod nnindex;

pub use backend::{BuildOptions, SearchBackend};
pub use backend_index::{ArtifactPaths, BackendNnIndex};
pub use distance::DistanceMethod;
pub use error::NnError;
pub use nnindex::NearestNeighborsIndex;
