use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use percept_descriptor::Descriptor;

use crate::error::CodeIndexError;

/// CodeIndex maps an integer code (a bit-hash bucket) to the descriptors
/// sharing that code, de-duplicated by uuid within a bucket.
///
/// With a file cache configured, the whole table is snapshotted after each
/// mutating call — once per batch for batched inserts, which bounds write
/// amplification under bulk loads. The table assumes a single writer; no
/// internal locking is provided.
pub struct CodeIndex<D> {
    table: HashMap<u64, HashMap<Uuid, D>>,
    count: usize,
    file_cache: Option<PathBuf>,
}

impl<D> CodeIndex<D>
where
    D: Descriptor + Serialize + DeserializeOwned,
{
    /// Create an index, reloading an existing snapshot if `file_cache`
    /// names one. Providing a path enables snapshotting on mutation.
    pub fn new(file_cache: Option<PathBuf>) -> Result<Self, CodeIndexError> {
        let mut index = Self {
            table: HashMap::new(),
            count: 0,
            file_cache,
        };
        if let Some(path) = index.file_cache.as_ref().filter(|p| p.is_file()) {
            debug!(path = %path.display(), "loading cached code index table");
            let r = BufReader::new(File::open(path)?);
            index.table =
                rmp_serde::from_read(r).map_err(|e| CodeIndexError::Serialization(e.to_string()))?;
            index.count = index.table.values().map(|bucket| bucket.len()).sum();
        }
        Ok(index)
    }

    /// Number of descriptors stored across all buckets. A descriptor filed
    /// under two codes counts once per code.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Set of distinct codes currently in the index.
    pub fn codes(&self) -> HashSet<u64> {
        self.table.keys().copied().collect()
    }

    /// Iterate over codes in arbitrary order.
    pub fn iter_codes(&self) -> impl Iterator<Item = u64> + '_ {
        self.table.keys().copied()
    }

    /// Add a descriptor under a code. Idempotent per (code, uuid): re-adding
    /// an already-present uuid replaces the stored descriptor without
    /// changing the count.
    pub fn add_descriptor(&mut self, code: u64, descriptor: D) -> Result<(), CodeIndexError> {
        self.insert(code, descriptor);
        self.cache_table()
    }

    /// Add many (code, descriptor) pairs with a single snapshot flush at
    /// the end.
    pub fn add_many_descriptors(
        &mut self,
        pairs: impl IntoIterator<Item = (u64, D)>,
    ) -> Result<(), CodeIndexError> {
        for (code, descriptor) in pairs {
            self.insert(code, descriptor);
        }
        self.cache_table()
    }

    /// Lazily iterate the descriptors filed under any of the given codes,
    /// in arbitrary order. Unknown codes contribute nothing.
    pub fn get_descriptors<'a, I>(&'a self, codes: I) -> impl Iterator<Item = &'a D>
    where
        I: IntoIterator<Item = u64>,
        I::IntoIter: 'a,
    {
        codes
            .into_iter()
            .filter_map(|c| self.table.get(&c))
            .flat_map(HashMap::values)
    }

    /// Remove every entry and persist the empty state.
    pub fn clear(&mut self) -> Result<(), CodeIndexError> {
        self.table.clear();
        self.count = 0;
        self.cache_table()
    }

    fn insert(&mut self, code: u64, descriptor: D) {
        let bucket = self.table.entry(code).or_default();
        if bucket.insert(descriptor.uuid(), descriptor).is_none() {
            self.count += 1;
        }
    }

    /// Snapshot the whole table to the file cache, if one is configured.
    fn cache_table(&self) -> Result<(), CodeIndexError> {
        let Some(path) = &self.file_cache else {
            return Ok(());
        };
        debug!(path = %path.display(), entries = self.count, "caching code index table");
        let mut w = BufWriter::new(File::create(path)?);
        rmp_serde::encode::write_named(&mut w, &self.table)
            .map_err(|e| CodeIndexError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use percept_descriptor::VectorDescriptor;

    fn d(v: f32) -> VectorDescriptor {
        VectorDescriptor::from_vec(vec![v])
    }

    #[test]
    fn test_add_is_idempotent_per_uuid() {
        let mut idx: CodeIndex<VectorDescriptor> = CodeIndex::new(None).unwrap();
        let a = d(1.0);

        idx.add_descriptor(7, a.clone()).unwrap();
        assert_eq!(idx.count(), 1);
        idx.add_descriptor(7, a.clone()).unwrap();
        assert_eq!(idx.count(), 1);

        // A different uuid under the same code increments the count.
        idx.add_descriptor(7, d(2.0)).unwrap();
        assert_eq!(idx.count(), 2);

        // The same uuid under a second code is stored and counted again.
        idx.add_descriptor(9, a).unwrap();
        assert_eq!(idx.count(), 3);
        assert_eq!(idx.codes(), [7u64, 9].into_iter().collect());
    }

    #[test]
    fn test_add_many_and_lookup() {
        let mut idx: CodeIndex<VectorDescriptor> = CodeIndex::new(None).unwrap();
        let d1 = d(1.0);
        let d2 = d(2.0);
        idx.add_many_descriptors([(1, d1.clone()), (2, d2.clone())])
            .unwrap();

        let got: Vec<Uuid> = idx.get_descriptors([1]).map(|x| x.uuid()).collect();
        assert_eq!(got, vec![d1.uuid()]);

        let mut union: Vec<Uuid> = idx.get_descriptors([1, 2, 99]).map(|x| x.uuid()).collect();
        union.sort();
        let mut expect = vec![d1.uuid(), d2.uuid()];
        expect.sort();
        assert_eq!(union, expect);

        assert_eq!(idx.get_descriptors([99]).count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut idx: CodeIndex<VectorDescriptor> = CodeIndex::new(None).unwrap();
        idx.add_many_descriptors([(1, d(1.0)), (2, d(2.0))]).unwrap();
        idx.clear().unwrap();
        assert_eq!(idx.count(), 0);
        assert!(idx.codes().is_empty());
    }

    #[test]
    fn test_snapshot_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.mp");
        let d1 = d(1.0);
        let d2 = d(2.0);

        {
            let mut idx: CodeIndex<VectorDescriptor> =
                CodeIndex::new(Some(path.clone())).unwrap();
            idx.add_many_descriptors([(1, d1.clone()), (1, d2.clone()), (5, d2.clone())])
                .unwrap();
        }

        let idx: CodeIndex<VectorDescriptor> = CodeIndex::new(Some(path.clone())).unwrap();
        assert_eq!(idx.count(), 3);
        assert_eq!(idx.codes(), [1u64, 5].into_iter().collect());
        let mut bucket: Vec<Uuid> = idx.get_descriptors([1]).map(|x| x.uuid()).collect();
        bucket.sort();
        let mut expect = vec![d1.uuid(), d2.uuid()];
        expect.sort();
        assert_eq!(bucket, expect);

        // Clearing persists the empty state.
        let mut idx = idx;
        idx.clear().unwrap();
        let reloaded: CodeIndex<VectorDescriptor> = CodeIndex::new(Some(path)).unwrap();
        assert_eq!(reloaded.count(), 0);
    }
}
