use crate::error::{Result, StoreError};
use crate::oplog::StoreLog;
use crate::types::{RecordFilter, SearchHit, VectorRecord};
use ndarray::ArrayView1;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

/// Number of independent lock shards; power of two, sized so unrelated
/// upserts rarely contend.
const SHARD_COUNT: usize = 16;

/// Similarity index over (id, vector, metadata) records.
///
/// Reads take per-shard read locks; an upsert takes exactly one shard's
/// write lock, so replacement of a record is atomic per id and no reader
/// ever observes a half-updated record. Concurrent queries may see
/// either side of an in-flight update to a different id.
pub struct VectorStore {
    dims: usize,
    shards: Vec<RwLock<HashMap<String, VectorRecord>>>,
    log: Option<Mutex<StoreLog>>,
    halted: AtomicBool,
}

impl VectorStore {
    /// Open a durable store, replaying persisted records.
    pub fn open(path: impl AsRef<Path>, dims: usize) -> Result<Self> {
        let (log, records) = StoreLog::open(path)?;
        let store = Self {
            dims,
            shards: (0..SHARD_COUNT)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
            log: Some(Mutex::new(log)),
            halted: AtomicBool::new(false),
        };

        for record in records {
            if record.vector.len() != dims {
                return Err(StoreError::Corrupt(format!(
                    "persisted record `{}` has dimension {}, store expects {}",
                    record.id,
                    record.vector.len(),
                    dims
                )));
            }
            store.insert_in_memory(record);
        }

        log::info!("vector store opened with {} records", store.len());
        Ok(store)
    }

    /// Ephemeral store with no persistence (tests, dry runs).
    #[must_use]
    pub fn in_memory(dims: usize) -> Self {
        Self {
            dims,
            shards: (0..SHARD_COUNT)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
            log: None,
            halted: AtomicBool::new(false),
        }
    }

    /// Configured vector dimensionality
    #[must_use]
    pub const fn dims(&self) -> usize {
        self.dims
    }

    /// Insert or atomically replace the record with this id.
    pub fn upsert(&self, record: VectorRecord) -> Result<()> {
        self.check_writable()?;
        if record.vector.len() != self.dims {
            return Err(StoreError::DimensionMismatch {
                expected: self.dims,
                actual: record.vector.len(),
            });
        }

        if let Some(log) = &self.log {
            let mut guard = lock_mutex(log);
            if let Err(e) = guard.append_upsert(&record) {
                self.halt(&e);
                return Err(e);
            }
        }

        self.insert_in_memory(record);
        Ok(())
    }

    /// Remove the record with this id, if present.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.check_writable()?;

        if let Some(log) = &self.log {
            let mut guard = lock_mutex(log);
            if let Err(e) = guard.append_delete(id) {
                self.halt(&e);
                return Err(e);
            }
        }

        let mut shard = write_shard(&self.shards[self.shard_for(id)]);
        shard.remove(id);
        Ok(())
    }

    /// Top-k records by cosine similarity (dot product over normalized
    /// vectors). Ties on score rank the lower id first; an empty store
    /// returns an empty result, never an error.
    pub fn query(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<SearchHit>> {
        if query.len() != self.dims {
            return Err(StoreError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_view = ArrayView1::from(query);
        let mut hits = Vec::new();
        for shard in &self.shards {
            let guard = read_shard(shard);
            for record in guard.values() {
                if let Some(filter) = filter {
                    if !filter.matches(&record.metadata) {
                        continue;
                    }
                }
                let score = query_view.dot(&ArrayView1::from(record.vector.as_slice()));
                hits.push(SearchHit {
                    id: record.id.clone(),
                    score,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Fetch a record by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        let shard = read_shard(&self.shards[self.shard_for(id)]);
        shard.get(id).cloned()
    }

    /// All record ids for one source file, sorted
    #[must_use]
    pub fn ids_for_path(&self, path: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .shards
            .iter()
            .flat_map(|shard| {
                read_shard(shard)
                    .values()
                    .filter(|r| r.metadata.source_path == path)
                    .map(|r| r.id.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        ids.sort();
        ids
    }

    /// The file digest recorded when this source file was last indexed
    #[must_use]
    pub fn file_digest(&self, path: &str) -> Option<String> {
        for shard in &self.shards {
            let guard = read_shard(shard);
            if let Some(record) = guard.values().find(|r| r.metadata.source_path == path) {
                return Some(record.metadata.file_digest.clone());
            }
        }
        None
    }

    /// Total number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| read_shard(s).len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| read_shard(s).is_empty())
    }

    /// Whether writes are halted after a persistence failure
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    fn insert_in_memory(&self, record: VectorRecord) {
        let mut shard = write_shard(&self.shards[self.shard_for(&record.id)]);
        shard.insert(record.id.clone(), record);
    }

    fn check_writable(&self) -> Result<()> {
        if self.is_halted() {
            return Err(StoreError::WritesHalted);
        }
        Ok(())
    }

    fn halt(&self, cause: &StoreError) {
        log::error!("halting store writes after persistence failure: {cause}");
        self.halted.store(true, Ordering::Release);
    }

    fn shard_for(&self, id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }
}

fn read_shard(
    shard: &RwLock<HashMap<String, VectorRecord>>,
) -> std::sync::RwLockReadGuard<'_, HashMap<String, VectorRecord>> {
    match shard.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_shard(
    shard: &RwLock<HashMap<String, VectorRecord>>,
) -> std::sync::RwLockWriteGuard<'_, HashMap<String, VectorRecord>> {
    match shard.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_mutex(log: &Mutex<StoreLog>) -> std::sync::MutexGuard<'_, StoreLog> {
    match log.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
