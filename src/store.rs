//! In-memory key-value store implementation with thread-safe access
//!
//! Every operation takes the map lock once, so a batch read or write is
//! atomic with respect to other connections.

use crate::error::Result;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Trait defining the interface for key-value storage operations
pub trait Store: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Set a key-value pair, replacing any previous value
    fn set(&self, key: Bytes, value: Bytes) -> Result<()>;

    /// Delete a key-value pair; returns whether the key was present
    fn delete(&self, key: &[u8]) -> Result<bool>;

    /// Get several keys at once, in the order given
    fn mget(&self, keys: &[Bytes]) -> Result<Vec<Option<Bytes>>>;

    /// Set several pairs at once; later pairs win for repeated keys
    fn mset(&self, pairs: Vec<(Bytes, Bytes)>) -> Result<()>;

    /// Get the number of stored items
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Thread-safe in-memory key-value store
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<Bytes, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: Bytes, value: Bytes) -> Result<()> {
        self.data.write().insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    fn mget(&self, keys: &[Bytes]) -> Result<Vec<Option<Bytes>>> {
        let data = self.data.read();
        Ok(keys.iter().map(|key| data.get(key).cloned()).collect())
    }

    fn mset(&self, pairs: Vec<(Bytes, Bytes)>) -> Result<()> {
        let mut data = self.data.write();
        data.extend(pairs);
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.data.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_memory_store_basic_operations() {
        let store = MemoryStore::new();
        assert!(store.is_empty().unwrap());

        store.set(b("key1"), b("value1")).unwrap();
        assert_eq!(store.get(b"key1").unwrap(), Some(b("value1")));
        assert_eq!(store.get(b"missing").unwrap(), None);

        assert!(store.delete(b"key1").unwrap());
        assert!(!store.delete(b"key1").unwrap()); // Already deleted
        assert_eq!(store.get(b"key1").unwrap(), None);
    }

    #[test]
    fn test_empty_value_is_stored() {
        let store = MemoryStore::new();
        store.set(b("k"), Bytes::new()).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(Bytes::new()));
    }

    #[test]
    fn test_mget_preserves_order_and_length() {
        let store = MemoryStore::new();
        store.set(b("x"), b("1")).unwrap();
        store.set(b("y"), b("2")).unwrap();

        let values = store.mget(&[b("y"), b("z"), b("x"), b("y")]).unwrap();
        assert_eq!(values, vec![Some(b("2")), None, Some(b("1")), Some(b("2"))]);
        assert!(store.mget(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_mset_later_pairs_win() {
        let store = MemoryStore::new();
        store
            .mset(vec![(b("a"), b("1")), (b("b"), b("2")), (b("a"), b("3"))])
            .unwrap();

        assert_eq!(store.get(b"a").unwrap(), Some(b("3")));
        assert_eq!(store.get(b"b").unwrap(), Some(b("2")));
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let key = b(&format!("key{}", i));
                let value = b(&format!("value{}", i));
                store.set(key.clone(), value.clone()).unwrap();
                assert_eq!(store.get(&key).unwrap(), Some(value));
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len().unwrap(), 10);
    }

    #[test]
    fn test_mset_is_never_observed_half_applied() {
        let store = Arc::new(MemoryStore::new());
        store.mset(vec![(b("p"), b("0")), (b("q"), b("0"))]).unwrap();

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 1..500 {
                    let v = b(&i.to_string());
                    store.mset(vec![(b("p"), v.clone()), (b("q"), v)]).unwrap();
                }
            })
        };

        for _ in 0..500 {
            let values = store.mget(&[b("p"), b("q")]).unwrap();
            assert_eq!(values[0], values[1]);
        }
        writer.join().unwrap();
    }
}
