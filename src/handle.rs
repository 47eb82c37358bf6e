//! Store Handle
//!
//! A caller-owned handle with an explicit lifecycle, for embedders that hold
//! a store reference before it is ready (an FFI or RPC layer, for example).
//! Until [`StoreHandle::open`] completes, and again after
//! [`StoreHandle::close`], every operation fails with `NotOpen`.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{BurrowError, Result};
use crate::index::KeySet;

pub struct StoreHandle {
    config: Config,
    engine: RwLock<Option<Arc<Engine>>>,
}

impl StoreHandle {
    /// Create an unopened handle
    pub fn new(config: Config) -> Self {
        Self {
            config,
            engine: RwLock::new(None),
        }
    }

    /// Recover the store and make it ready. Opening an open handle is a no-op.
    pub fn open(&self) -> Result<()> {
        let mut slot = self.engine.write();
        if slot.is_none() {
            *slot = Some(Arc::new(Engine::open(self.config.clone())?));
        }
        Ok(())
    }

    /// Sync and close the store. Closing an unopened handle is a no-op.
    ///
    /// Calls already in flight on another thread finish against the engine
    /// they started with. The handle stays locked until the engine is
    /// closed, so a concurrent `open` cannot start a second engine on the
    /// same directory while the first is still shutting down.
    pub fn close(&self) -> Result<()> {
        let mut slot = self.engine.write();
        match slot.take() {
            Some(engine) => engine.close(),
            None => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.engine.read().is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The open engine, or `NotOpen`
    pub fn engine(&self) -> Result<Arc<Engine>> {
        self.engine.read().clone().ok_or(BurrowError::NotOpen)
    }

    // =========================================================================
    // Engine operations
    // =========================================================================

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.engine()?.get(key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.engine()?.set(key, value)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.engine()?.remove(key)
    }

    pub fn clear(&self) -> Result<()> {
        self.engine()?.clear()
    }

    pub fn multi_get<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<(String, Option<String>)>> {
        self.engine()?.multi_get(keys)
    }

    pub fn multi_set<K, V>(&self, pairs: &[(K, V)]) -> Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.engine()?.multi_set(pairs)
    }

    pub fn multi_remove<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        self.engine()?.multi_remove(keys)
    }

    pub fn all_keys(&self) -> Result<KeySet> {
        self.engine()?.all_keys()
    }

    pub fn merge_item(&self, key: &str, delta: &str) -> Result<String> {
        self.engine()?.merge_item(key, delta)
    }

    pub fn compact(&self) -> Result<()> {
        self.engine()?.compact()
    }
}
