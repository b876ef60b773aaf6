//! Dense index over task ids.
//!
//! The CPM passes run over `Vec`s indexed by position instead of hashing
//! string ids on every lookup.

use rustc_hash::FxHashMap;

/// Position of a task inside a `TaskIndex`.
pub type TaskIdx = usize;

/// Bidirectional mapping between task id strings and dense indices.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex {
    to_idx: FxHashMap<String, TaskIdx>,
    ids: Vec<String>,
}

impl TaskIndex {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_idx: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            ids: Vec::with_capacity(capacity),
        }
    }

    /// Index ids in the given order. Returns the first repeated id as the error.
    pub fn from_ids<'a, I>(ids: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let iter = ids.into_iter();
        let mut index = Self::with_capacity(iter.size_hint().0);
        for id in iter {
            if index.get(id).is_some() {
                return Err(id.clone());
            }
            index.insert(id);
        }
        Ok(index)
    }

    /// Add an id, returning its index. Existing ids keep their index.
    pub fn insert(&mut self, id: &str) -> TaskIdx {
        if let Some(&idx) = self.to_idx.get(id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id.to_string());
        self.to_idx.insert(id.to_string(), idx);
        idx
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<TaskIdx> {
        self.to_idx.get(id).copied()
    }

    #[inline]
    pub fn resolve(&self, idx: TaskIdx) -> Option<&str> {
        self.ids.get(idx).map(|s| s.as_str())
    }

    /// Ids in index order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
