// SPDX-License-Identifier: GPL-3.0-only

//! All-or-nothing property cache for one remote object.
//!
//! The cache is filled by a single full fetch and dropped as a whole whenever
//! the remote service reports a change. There is no per-key refresh: a key
//! missing after a full fetch simply does not exist on the object.

use std::future::Future;

use devhal_types::{ObjectProperties, PropValue, PropertyMap};
use tokio::sync::{Mutex, MutexGuard};

use crate::BusError;

#[derive(Debug, Default, Clone)]
pub struct PropertyCache {
    populated: bool,
    interfaces: ObjectProperties,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn populate(&mut self, properties: ObjectProperties) {
        self.interfaces = properties;
        self.populated = true;
    }

    pub fn invalidate(&mut self) {
        self.interfaces.clear();
        self.populated = false;
    }

    /// Looks a property up across every cached interface.
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.interfaces.values().find_map(|props| props.get(key))
    }

    pub fn get_in(&self, interface: &str, key: &str) -> Option<&PropValue> {
        self.interfaces.get(interface).and_then(|props| props.get(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn has_interface(&self, interface: &str) -> bool {
        self.interfaces.contains_key(interface)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.interfaces.keys().map(String::as_str)
    }

    /// Every cached property in one map; earlier interfaces win on name clashes.
    pub fn flattened(&self) -> PropertyMap {
        let mut out = PropertyMap::new();
        for props in self.interfaces.values() {
            for (key, value) in props {
                out.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        out
    }
}

/// A [`PropertyCache`] shared between the tasks of one adapter.
#[derive(Debug, Default)]
pub struct CachedProperties {
    inner: Mutex<PropertyCache>,
}

impl CachedProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache, running `fetch` first when it is not populated.
    ///
    /// A failed fetch leaves the cache empty so the next access retries.
    pub async fn load<F, Fut>(&self, fetch: F) -> Result<MutexGuard<'_, PropertyCache>, BusError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ObjectProperties, BusError>>,
    {
        let mut guard = self.inner.lock().await;
        if !guard.is_populated() {
            let properties = fetch().await?;
            guard.populate(properties);
        }
        Ok(guard)
    }

    pub async fn invalidate(&self) {
        self.inner.lock().await.invalidate();
    }
}
