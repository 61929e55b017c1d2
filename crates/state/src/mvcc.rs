// Path: crates/state/src/mvcc.rs
//! An in-memory multi-version, copy-on-write key-value store with tagged
//! snapshots.
//!
//! Versions form a tree rooted at the durable base map. Each version holds
//! only its own write set; reads walk the parent chain and fall through to
//! the base. `flush` folds an irreversible snapshot into the base and prunes
//! every version that is not a descendant of it, so the chain a read walks
//! stays bounded by the unfinalized suffix.

use kaon_api::state::{MvccStore, StateAccess};
use kaon_types::error::StateError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

type WriteSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

struct VersionData {
    parent: Option<u64>,
    writes: WriteSet,
}

struct Inner {
    base: BTreeMap<Vec<u8>, Vec<u8>>,
    versions: HashMap<u64, VersionData>,
    tags: HashMap<String, u64>,
    next_id: u64,
}

impl Inner {
    fn alloc(&mut self, parent: Option<u64>, writes: WriteSet) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.versions.insert(id, VersionData { parent, writes });
        id
    }

    fn lookup(&self, mut version: Option<u64>, key: &[u8]) -> Option<Vec<u8>> {
        while let Some(id) = version {
            let Some(data) = self.versions.get(&id) else {
                break;
            };
            if let Some(value_opt) = data.writes.get(key) {
                return value_opt.clone();
            }
            version = data.parent;
        }
        self.base.get(key).cloned()
    }

    fn is_descendant_or_self(&self, mut version: u64, ancestor: u64) -> bool {
        loop {
            if version == ancestor {
                return true;
            }
            match self.versions.get(&version).and_then(|v| v.parent) {
                Some(parent) => version = parent,
                None => return false,
            }
        }
    }

    /// The version ids from the root down to `target`, inclusive.
    fn path_to(&self, target: u64) -> Vec<u64> {
        let mut path = Vec::new();
        let mut cursor = Some(target);
        while let Some(id) = cursor {
            path.push(id);
            cursor = self.versions.get(&id).and_then(|v| v.parent);
        }
        path.reverse();
        path
    }
}

/// A handle onto the shared multi-version store. Cloning produces an
/// independent handle (own current snapshot, own overlay) over the same
/// version tree, which is how the RPC surface reads forks without
/// disturbing the producer.
pub struct MemMvccStore {
    inner: Arc<RwLock<Inner>>,
    current: u64,
    current_tag: Option<String>,
    overlay: Option<WriteSet>,
}

impl MemMvccStore {
    /// Creates an empty store with a single root version tagged `genesis`.
    pub fn new() -> Self {
        let mut inner = Inner {
            base: BTreeMap::new(),
            versions: HashMap::new(),
            tags: HashMap::new(),
            next_id: 0,
        };
        let root = inner.alloc(None, WriteSet::new());
        Self {
            inner: Arc::new(RwLock::new(inner)),
            current: root,
            current_tag: None,
            overlay: None,
        }
    }

    /// A new handle over the same version tree, positioned at this handle's
    /// current snapshot, with no overlay.
    pub fn handle(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            current: self.current,
            current_tag: self.current_tag.clone(),
            overlay: None,
        }
    }

    /// True when the tag names a known snapshot.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.inner.read().tags.contains_key(tag)
    }
}

impl Default for MemMvccStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateAccess for MemMvccStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        if let Some(overlay) = &self.overlay {
            if let Some(value_opt) = overlay.get(key) {
                return Ok(value_opt.clone());
            }
        }
        Ok(self.inner.read().lookup(Some(self.current), key))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        match &mut self.overlay {
            Some(overlay) => {
                overlay.insert(key.to_vec(), Some(value.to_vec()));
                Ok(())
            }
            // Writes outside a fork land directly in the current version.
            None => {
                let mut inner = self.inner.write();
                match inner.versions.get_mut(&self.current) {
                    Some(version) => {
                        version.writes.insert(key.to_vec(), Some(value.to_vec()));
                        Ok(())
                    }
                    None => Err(StateError::Backend("current version pruned".into())),
                }
            }
        }
    }

    fn del(&mut self, key: &[u8]) -> Result<(), StateError> {
        match &mut self.overlay {
            Some(overlay) => {
                overlay.insert(key.to_vec(), None);
                Ok(())
            }
            None => {
                let mut inner = self.inner.write();
                match inner.versions.get_mut(&self.current) {
                    Some(version) => {
                        version.writes.insert(key.to_vec(), None);
                        Ok(())
                    }
                    None => Err(StateError::Backend("current version pruned".into())),
                }
            }
        }
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        let inner = self.inner.read();
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();

        // Oldest first so newer layers shadow older ones.
        for (key, value) in inner.base.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.clone(), Some(value.clone()));
        }
        for id in inner.path_to(self.current) {
            if let Some(data) = inner.versions.get(&id) {
                for (key, value_opt) in data.writes.range(prefix.to_vec()..) {
                    if !key.starts_with(prefix) {
                        break;
                    }
                    merged.insert(key.clone(), value_opt.clone());
                }
            }
        }
        if let Some(overlay) = &self.overlay {
            for (key, value_opt) in overlay.range(prefix.to_vec()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                merged.insert(key.clone(), value_opt.clone());
            }
        }
        Ok(merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }
}

impl MvccStore for MemMvccStore {
    fn checkout(&mut self, tag: &str) -> bool {
        let inner = self.inner.read();
        match inner.tags.get(tag) {
            Some(&id) => {
                self.current = id;
                self.current_tag = Some(tag.to_string());
                self.overlay = None;
                true
            }
            None => false,
        }
    }

    fn tag(&mut self, tag: &str) {
        self.inner
            .write()
            .tags
            .insert(tag.to_string(), self.current);
        self.current_tag = Some(tag.to_string());
    }

    fn fork(&mut self) {
        self.overlay = Some(WriteSet::new());
    }

    fn commit(&mut self) {
        let writes = self.overlay.take().unwrap_or_default();
        let mut inner = self.inner.write();
        self.current = inner.alloc(Some(self.current), writes);
        self.current_tag = None;
    }

    fn rollback(&mut self) {
        self.overlay = None;
    }

    fn flush(&mut self, tag: &str) -> Result<(), StateError> {
        let mut inner = self.inner.write();
        let target = *inner
            .tags
            .get(tag)
            .ok_or_else(|| StateError::UnknownTag(tag.to_string()))?;

        // Fold the root..target path into the base, oldest first.
        for id in inner.path_to(target) {
            let writes = match inner.versions.get(&id) {
                Some(data) => data.writes.clone(),
                None => continue,
            };
            for (key, value_opt) in writes {
                match value_opt {
                    Some(value) => {
                        inner.base.insert(key, value);
                    }
                    None => {
                        inner.base.remove(&key);
                    }
                }
            }
        }

        // Prune everything that is not the target or one of its descendants.
        let keep: Vec<u64> = inner
            .versions
            .keys()
            .copied()
            .filter(|&id| inner.is_descendant_or_self(id, target))
            .collect();
        let keep_set: std::collections::HashSet<u64> = keep.into_iter().collect();
        inner.versions.retain(|id, _| keep_set.contains(id));
        inner.tags.retain(|_, id| keep_set.contains(id));

        // The target becomes the new root; its writes are in the base now.
        if let Some(data) = inner.versions.get_mut(&target) {
            data.parent = None;
            data.writes.clear();
        }

        if !keep_set.contains(&self.current) {
            self.current = target;
            self.current_tag = Some(tag.to_string());
            self.overlay = None;
        }
        tracing::debug!(target: "state", tag, live_versions = inner.versions.len(), "flushed snapshot into base");
        Ok(())
    }

    fn current_tag(&self) -> Option<String> {
        self.current_tag.clone()
    }
}
