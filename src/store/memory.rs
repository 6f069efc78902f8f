//! In-process backend.
//!
//! Holds everything behind one mutex, so every [`WriteBatch`] is trivially
//! atomic. Used by tests and by `--store memory` for throwaway runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::backend::{KvStore, ScoredMember, StoreError, StoreResult, WriteBatch, WriteOp};

#[derive(Debug, Default)]
struct Data {
    scalars: HashMap<String, Vec<u8>>,
    sets: HashMap<String, BTreeSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
}

impl Data {
    fn kind_conflict(&self, key: &str, wanted: Kind) -> bool {
        let scalar = self.scalars.contains_key(key);
        let set = self.sets.contains_key(key);
        let zset = self.zsets.contains_key(key);
        match wanted {
            Kind::Scalar => set || zset,
            Kind::Set => scalar || zset,
            Kind::ZSet => scalar || set,
        }
    }

    fn remove_key(&mut self, key: &str) {
        self.scalars.remove(key);
        self.sets.remove(key);
        self.zsets.remove(key);
    }

    fn apply_op(&mut self, op: WriteOp) {
        match op {
            WriteOp::Set { key, value } => {
                self.remove_key(&key);
                self.scalars.insert(key, value);
            }
            WriteOp::Delete { key } => self.remove_key(&key),
            WriteOp::SetAdd { key, member } => {
                self.sets.entry(key).or_default().insert(member);
            }
            WriteOp::SetRemove { key, member } => {
                if let Some(set) = self.sets.get_mut(&key) {
                    set.remove(&member);
                    if set.is_empty() {
                        self.sets.remove(&key);
                    }
                }
            }
            WriteOp::ZAdd { key, member, score } => {
                self.zsets.entry(key).or_default().insert(member, score);
            }
            WriteOp::ZRemove { key, member } => {
                if let Some(zset) = self.zsets.get_mut(&key) {
                    zset.remove(&member);
                    if zset.is_empty() {
                        self.zsets.remove(&key);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Scalar,
    Set,
    ZSet,
}

/// Thread-safe in-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Data>> {
        self.data.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl KvStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let data = self.lock()?;
        if data.kind_conflict(key, Kind::Scalar) {
            return Err(StoreError::WrongKind(key.to_string()));
        }
        Ok(data.scalars.get(key).cloned())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let data = self.lock()?;
        Ok(data.scalars.contains_key(key)
            || data.sets.contains_key(key)
            || data.zsets.contains_key(key))
    }

    fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let data = self.lock()?;
        if data.kind_conflict(key, Kind::Set) {
            return Err(StoreError::WrongKind(key.to_string()));
        }
        Ok(data
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn zrange(&self, key: &str) -> StoreResult<Vec<ScoredMember>> {
        let data = self.lock()?;
        if data.kind_conflict(key, Kind::ZSet) {
            return Err(StoreError::WrongKind(key.to_string()));
        }
        let mut members: Vec<ScoredMember> = data
            .zsets
            .get(key)
            .map(|zset| {
                zset.iter()
                    .map(|(member, score)| ScoredMember {
                        member: member.clone(),
                        score: *score,
                    })
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then_with(|| a.member.cmp(&b.member))
        });
        Ok(members)
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let data = self.lock()?;
        let keys: BTreeSet<&String> = data
            .scalars
            .keys()
            .chain(data.sets.keys())
            .chain(data.zsets.keys())
            .filter(|k| k.starts_with(prefix))
            .collect();
        Ok(keys.into_iter().cloned().collect())
    }

    fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut data = self.lock()?;

        // Validate kinds up front so a rejected batch writes nothing.
        let mut staged: HashMap<&str, Option<Kind>> = HashMap::new();
        for op in batch.ops() {
            let (key, kind) = match op {
                WriteOp::Set { key, .. } => (key, Kind::Scalar),
                WriteOp::Delete { key } => {
                    staged.insert(key.as_str(), None);
                    continue;
                }
                WriteOp::SetAdd { key, .. } | WriteOp::SetRemove { key, .. } => (key, Kind::Set),
                WriteOp::ZAdd { key, .. } | WriteOp::ZRemove { key, .. } => (key, Kind::ZSet),
            };
            let conflict = kind != Kind::Scalar
                && match staged.get(key.as_str()) {
                    Some(Some(prev)) => *prev != kind,
                    Some(None) => false,
                    None => data.kind_conflict(key, kind),
                };
            if conflict {
                return Err(StoreError::WrongKind(key.clone()));
            }
            staged.insert(key.as_str(), Some(kind));
        }

        for op in batch.into_ops() {
            data.apply_op(op);
        }
        Ok(())
    }
}
