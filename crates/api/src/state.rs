// Path: crates/api/src/state.rs
//! State access traits: raw key-value reads/writes, copy-on-write overlays,
//! and the tagged multi-version store contract.

use kaon_types::error::StateError;
use std::collections::BTreeMap;

/// A dyn-safe key-value view. Both committed snapshots and writable
/// overlays implement this.
pub trait StateAccess: Send + Sync {
    /// Gets a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError>;

    /// Inserts a key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError>;

    /// Deletes a key.
    fn del(&mut self, key: &[u8]) -> Result<(), StateError>;

    /// True when the key is present.
    fn has(&self, key: &[u8]) -> Result<bool, StateError> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns all key-value pairs whose key starts with `prefix`, in key
    /// order. Used by the map key-space for field enumeration.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError>;
}

impl<T: StateAccess + ?Sized> StateAccess for Box<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        (**self).get(key)
    }
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        (**self).put(key, value)
    }
    fn del(&mut self, key: &[u8]) -> Result<(), StateError> {
        (**self).del(key)
    }
    fn has(&self, key: &[u8]) -> Result<bool, StateError> {
        (**self).has(key)
    }
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        (**self).prefix_scan(prefix)
    }
}

/// The multi-version, copy-on-write store contract (spec'd by the external
/// KV collaborator): snapshots are addressed by opaque string tags,
/// typically the base58 head hash of the block that produced them.
pub trait MvccStore: StateAccess {
    /// Makes the snapshot named `tag` current. Returns false when the tag
    /// is unknown.
    fn checkout(&mut self, tag: &str) -> bool;

    /// Names the current snapshot.
    fn tag(&mut self, tag: &str);

    /// Begins a writable overlay on top of the current snapshot. Writes go
    /// to the overlay until `commit`.
    fn fork(&mut self);

    /// Folds the overlay into a new current snapshot.
    fn commit(&mut self);

    /// Discards the overlay, restoring the pre-fork snapshot.
    fn rollback(&mut self);

    /// Materializes the snapshot named `tag` into the durable base and
    /// prunes every version at or before it, including abandoned branches.
    fn flush(&mut self, tag: &str) -> Result<(), StateError>;

    /// The tag of the current snapshot, if it has been named.
    fn current_tag(&self) -> Option<String>;
}

/// An in-memory, copy-on-write overlay over any [`StateAccess`].
///
/// Reads consult the local write set first and fall through to the base;
/// writes never touch the base. `BTreeMap` keeps the commit order
/// deterministic.
pub struct StateOverlay<'a> {
    base: &'a dyn StateAccess,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> StateOverlay<'a> {
    /// Creates an empty overlay over `base`.
    pub fn new(base: &'a dyn StateAccess) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Consumes the overlay, returning its writes in deterministic key
    /// order. `None` values are deletions.
    pub fn into_writes(self) -> BTreeMap<Vec<u8>, Option<Vec<u8>>> {
        self.writes
    }

    /// Discards all buffered writes.
    pub fn clear(&mut self) {
        self.writes.clear();
    }
}

impl StateAccess for StateOverlay<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        match self.writes.get(key) {
            Some(value_opt) => Ok(value_opt.clone()),
            None => self.base.get(key),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn del(&mut self, key: &[u8]) -> Result<(), StateError> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .base
            .prefix_scan(prefix)?
            .into_iter()
            .collect();
        for (key, value_opt) in self.writes.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value_opt {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;

    #[derive(Default)]
    struct MemState(RwLock<BTreeMap<Vec<u8>, Vec<u8>>>);

    impl StateAccess for MemState {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
            Ok(self.0.read().get(key).cloned())
        }
        fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
            self.0.write().insert(key.to_vec(), value.to_vec());
            Ok(())
        }
        fn del(&mut self, key: &[u8]) -> Result<(), StateError> {
            self.0.write().remove(key);
            Ok(())
        }
        fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
            Ok(self
                .0
                .read()
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        }
    }

    #[test]
    fn overlay_shadows_base() {
        let mut base = MemState::default();
        base.put(b"a", b"1").unwrap();
        base.put(b"b", b"2").unwrap();

        let mut ov = StateOverlay::new(&base);
        assert_eq!(ov.get(b"a").unwrap(), Some(b"1".to_vec()));
        ov.put(b"a", b"overlaid").unwrap();
        ov.del(b"b").unwrap();
        assert_eq!(ov.get(b"a").unwrap(), Some(b"overlaid".to_vec()));
        assert_eq!(ov.get(b"b").unwrap(), None);

        // Base is untouched.
        assert_eq!(base.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(base.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn overlay_scan_merges_and_masks() {
        let mut base = MemState::default();
        base.put(b"m/x", b"1").unwrap();
        base.put(b"m/y", b"2").unwrap();
        base.put(b"n/z", b"3").unwrap();

        let mut ov = StateOverlay::new(&base);
        ov.put(b"m/w", b"0").unwrap();
        ov.del(b"m/y").unwrap();

        let got = ov.prefix_scan(b"m/").unwrap();
        assert_eq!(
            got,
            vec![
                (b"m/w".to_vec(), b"0".to_vec()),
                (b"m/x".to_vec(), b"1".to_vec()),
            ]
        );
    }

    #[test]
    fn into_writes_is_ordered() {
        let base = MemState::default();
        let mut ov = StateOverlay::new(&base);
        ov.put(b"z", b"1").unwrap();
        ov.put(b"a", b"2").unwrap();
        let writes: Vec<_> = ov.into_writes().into_keys().collect();
        assert_eq!(writes, vec![b"a".to_vec(), b"z".to_vec()]);
    }
}
