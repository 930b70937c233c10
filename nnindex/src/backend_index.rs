use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use percept_descriptor::Descriptor;

use crate::backend::{BuildOptions, SearchBackend};
use crate::distance::DistanceMethod;
use crate::error::NnError;
use crate::nnindex::NearestNeighborsIndex;

/// Locations of the three persisted index artifacts. Each is independently
/// optional; persistence of an artifact is skipped when its path is unset.
///
/// Auto-loading at construction and cross-process reloading require all
/// three to be configured and present — partial presence is treated as no
/// persisted model.
#[derive(Debug, Clone, Default)]
pub struct ArtifactPaths {
    /// Position-addressable descriptor corpus cache.
    pub descriptor_cache: Option<PathBuf>,
    /// Opaque backend search structure.
    pub index: Option<PathBuf>,
    /// Build metadata: distance metric, build options, achieved parameters.
    pub parameters: Option<PathBuf>,
}

impl ArtifactPaths {
    fn all_present(&self) -> bool {
        [&self.descriptor_cache, &self.index, &self.parameters]
            .iter()
            .all(|p| p.as_ref().is_some_and(|p| p.is_file()))
    }
}

/// Persisted metadata artifact.
#[derive(Serialize, Deserialize)]
struct IndexMeta<P> {
    distance: DistanceMethod,
    options: BuildOptions,
    params: P,
}

/// Nearest-neighbor index backed by an external [SearchBackend].
///
/// The backend handle is a native structure that cannot safely cross a
/// process boundary. The index records the owning process id at build/load
/// time and, when queried from a different process, reloads the handle from
/// the persisted artifacts. Without persisted artifacts, cross-process
/// reuse fails explicitly instead of touching the stale handle.
pub struct BackendNnIndex<D, B: SearchBackend> {
    paths: ArtifactPaths,
    distance: DistanceMethod,
    options: BuildOptions,
    // In-order corpus cache: position i pairs with backend row i for the
    // lifetime of one build.
    cache: Vec<D>,
    backend: Option<B>,
    params: Option<B::Params>,
    pid: Option<u32>,
}

impl<D, B> BackendNnIndex<D, B>
where
    D: Descriptor + Clone + Serialize + DeserializeOwned,
    B: SearchBackend,
{
    /// Create an index. If all three artifacts are configured and present,
    /// the persisted model is loaded immediately.
    pub fn new(
        paths: ArtifactPaths,
        distance: DistanceMethod,
        options: BuildOptions,
    ) -> Result<Self, NnError> {
        let mut index = Self {
            paths,
            distance,
            options,
            cache: Vec::new(),
            backend: None,
            params: None,
            pid: None,
        };
        if index.paths.all_present() {
            info!("found existing index artifacts, loading");
            index.load_model()?;
        }
        Ok(index)
    }

    /// The distance metric queries run under. After loading persisted
    /// artifacts this is the metric the index was built with, which takes
    /// precedence over the configured one.
    pub fn distance(&self) -> DistanceMethod {
        self.distance
    }

    fn matrix(&self) -> Vec<Vec<f32>> {
        self.cache.iter().map(|d| d.vector().to_vec()).collect()
    }

    fn load_model(&mut self) -> Result<(), NnError> {
        // Paths were checked by the caller; treat absence here as an error.
        let cache_path = required(&self.paths.descriptor_cache)?;
        let index_path = required(&self.paths.index)?;
        let params_path = required(&self.paths.parameters)?;

        debug!(path = %params_path.display(), "loading index metadata");
        let meta: IndexMeta<B::Params> = read_msgpack(params_path)?;
        // The stored metric wins over whatever this instance was configured
        // with, matching the structure the blob was built under.
        self.distance = meta.distance;
        self.options = meta.options;

        debug!(path = %cache_path.display(), "loading cached descriptors");
        self.cache = read_msgpack(cache_path)?;

        debug!(path = %index_path.display(), "loading backend search structure");
        let matrix = self.matrix();
        self.backend = Some(B::load(index_path, &matrix, self.distance, &meta.params)?);
        self.params = Some(meta.params);
        self.pid = Some(std::process::id());
        Ok(())
    }

    /// Reload the backend handle if this process is not the one that
    /// built/loaded it. No-op in the owning process.
    fn restore_index(&mut self) -> Result<(), NnError> {
        let built = match self.pid {
            Some(pid) => pid,
            None => return Ok(()),
        };
        let current = std::process::id();
        if built == current {
            return Ok(());
        }
        if !self.paths.all_present() {
            return Err(NnError::StaleProcess { built, current });
        }
        info!(built, current, "process changed, reloading index from artifacts");
        self.load_model()
    }
}

impl<D, B> NearestNeighborsIndex<D> for BackendNnIndex<D, B>
where
    D: Descriptor + Clone + Serialize + DeserializeOwned,
    B: SearchBackend,
{
    fn count(&self) -> usize {
        self.cache.len()
    }

    fn build_index(&mut self, corpus: Vec<D>) -> Result<(), NnError> {
        // Not restoring any previous handle: it is being replaced wholesale.
        if corpus.is_empty() {
            return Err(NnError::EmptyCorpus);
        }
        info!(count = corpus.len(), "building new backend index");
        self.cache = corpus;

        if let Some(path) = &self.paths.descriptor_cache {
            debug!(path = %path.display(), "caching descriptors");
            write_msgpack(path, &self.cache)?;
        }

        let matrix = self.matrix();
        let (backend, params) = B::build(&matrix, self.distance, &self.options)?;

        if let Some(path) = &self.paths.index {
            debug!(path = %path.display(), "caching backend search structure");
            ensure_parent(path)?;
            backend.save(path)?;
        }
        if let Some(path) = &self.paths.parameters {
            debug!(path = %path.display(), "caching index metadata");
            write_msgpack(
                path,
                &IndexMeta {
                    distance: self.distance,
                    options: self.options.clone(),
                    params: params.clone(),
                },
            )?;
        }

        self.backend = Some(backend);
        self.params = Some(params);
        self.pid = Some(std::process::id());
        Ok(())
    }

    fn nn(&mut self, d: &D, n: usize) -> Result<(Vec<D>, Vec<f32>), NnError> {
        let vec = d.vector();
        if vec.is_empty() {
            return Err(NnError::EmptyQuery);
        }
        if self.cache.is_empty() {
            return Err(NnError::EmptyIndex);
        }
        self.restore_index()?;

        let (backend, params) = match (&self.backend, &self.params) {
            (Some(b), Some(p)) => (b, p),
            _ => return Err(NnError::EmptyIndex),
        };

        let (neighbors, dists) = if self.distance.is_similarity() {
            // The backend orders by ascending raw score, which for a
            // similarity puts the nearest row last. Query the full index,
            // invert into distance convention, reverse, then truncate.
            let (idxs, scores) = backend.knn(vec, self.cache.len(), params)?;
            let idxs = flatten(idxs);
            let scores = flatten(scores);
            let take = n.min(idxs.len());
            let neighbors: Vec<D> = idxs
                .iter()
                .rev()
                .take(take)
                .map(|&i| self.cache[i].clone())
                .collect();
            let dists: Vec<f32> = scores.iter().rev().take(take).map(|&s| 1.0 - s).collect();
            (neighbors, dists)
        } else {
            let k = n.min(self.cache.len());
            let (idxs, dists) = backend.knn(vec, k, params)?;
            let idxs = flatten(idxs);
            let dists = flatten(dists);
            let neighbors = idxs.iter().map(|&i| self.cache[i].clone()).collect();
            (neighbors, dists)
        };
        Ok((neighbors, dists))
    }
}

/// Reduce a batched backend result to its first row. Backends may return a
/// higher-rank structure even for a single query.
fn flatten<T>(batched: Vec<Vec<T>>) -> Vec<T> {
    batched.into_iter().next().unwrap_or_default()
}

fn required(path: &Option<PathBuf>) -> Result<&Path, NnError> {
    path.as_deref()
        .ok_or_else(|| NnError::Io("artifact path not configured".into()))
}

fn ensure_parent(path: &Path) -> Result<(), NnError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn write_msgpack<T: Serialize>(path: &Path, value: &T) -> Result<(), NnError> {
    ensure_parent(path)?;
    let mut w = BufWriter::new(File::create(path)?);
    rmp_serde::encode::write_named(&mut w, value)
        .map_err(|e| NnError::Serialization(e.to_string()))
}

fn read_msgpack<T: DeserializeOwned>(path: &Path) -> Result<T, NnError> {
    let r = BufReader::new(File::open(path)?);
    rmp_serde::from_read(r).map_err(|e| NnError::Serialization(e.to_string()))
}
