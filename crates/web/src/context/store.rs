//! The per-request key/value store.
//!
//! String keys, heterogeneous values. Reads take a shared lock, writes an
//! exclusive one; values are `Arc`ed so a store copy is shallow (the same
//! semantics a copied context needs).

use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type Value = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct Store {
    map: RwLock<HashMap<String, Value>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_map(map: HashMap<String, Value>) -> Self {
        Self { map: RwLock::new(map) }
    }

    pub fn set<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        let mut map = self.map.write().expect("store lock poisoned");
        map.insert(key.into(), Arc::new(value));
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let map = self.map.read().expect("store lock poisoned");
        map.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        let map = self.map.read().expect("store lock poisoned");
        map.contains_key(key)
    }

    pub(crate) fn snapshot(&self) -> HashMap<String, Value> {
        let map = self.map.read().expect("store lock poisoned");
        map.clone()
    }

    fn get_as<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.downcast_ref::<T>().cloned())
    }

    /// Typed accessors return the zero value when the key is missing or the
    /// stored type does not match.
    pub fn get_string(&self, key: &str) -> String {
        self.get_as::<String>(key).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get_as::<bool>(key).unwrap_or_default()
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.get_as::<i64>(key).unwrap_or_default()
    }

    pub fn get_f64(&self, key: &str) -> f64 {
        self.get_as::<f64>(key).unwrap_or_default()
    }

    pub fn get_time(&self, key: &str) -> DateTime<Utc> {
        self.get_as::<DateTime<Utc>>(key).unwrap_or_default()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.map.read().expect("store lock poisoned");
        f.debug_struct("Store").field("keys", &map.keys().collect::<Vec<_>>()).finish()
    }
}
