// candor/src/providers/registry.rs
//
// Model registry for provider implementations that host their own models.
//
// Each name maps to an Arc'd, versioned model. Callers `acquire` an Arc and
// run inference on it without holding any registry lock. `reload` swaps in a
// new version atomically; calls already in flight keep the old Arc and the
// old model is dropped when the last of them finishes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use super::{ProviderError, ProviderResult};

#[derive(Debug)]
pub struct VersionedModel<M> {
    pub name: String,
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub model: M,
}

impl<M> VersionedModel<M> {
    fn new(name: &str, version: u64, model: M) -> Self {
        Self { name: name.to_string(), version, loaded_at: Utc::now(), model }
    }
}

pub struct ModelRegistry<M> {
    models: DashMap<String, Arc<VersionedModel<M>>>,
}

impl<M> ModelRegistry<M> {
    pub fn new() -> Self {
        Self { models: DashMap::new() }
    }

    /// Installs `model` under `name`, replacing any current version.
    /// Returns the version number now live.
    pub fn load(&self, name: &str, model: M) -> u64 {
        let version = self.swap(name, model);
        info!(model = name, version, "model loaded");
        version
    }

    /// Like `load`, but only for a name that is already registered.
    pub fn reload(&self, name: &str, model: M) -> ProviderResult<u64> {
        if !self.models.contains_key(name) {
            return Err(ProviderError::Unavailable(format!("model {} is not loaded", name)));
        }
        let version = self.swap(name, model);
        info!(model = name, version, "model reloaded");
        Ok(version)
    }

    fn swap(&self, name: &str, model: M) -> u64 {
        match self.models.entry(name.to_string()) {
            Entry::Occupied(mut o) => {
                let version = o.get().version + 1;
                // The previous Arc lives on in any caller still holding it.
                o.insert(Arc::new(VersionedModel::new(name, version, model)));
                version
            }
            Entry::Vacant(v) => {
                v.insert(Arc::new(VersionedModel::new(name, 1, model)));
                1
            }
        }
    }

    pub fn acquire(&self, name: &str) -> ProviderResult<Arc<VersionedModel<M>>> {
        self.models
            .get(name)
            .map(|m| Arc::clone(m.value()))
            .ok_or_else(|| ProviderError::Unavailable(format!("model {} is not loaded", name)))
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn unload(&self, name: &str) -> Option<Arc<VersionedModel<M>>> {
        let removed = self.models.remove(name).map(|(_, m)| m);
        if removed.is_some() {
            info!(model = name, "model unloaded");
        }
        removed
    }

    /// Outstanding acquisitions of the live version of `name`.
    pub fn in_flight(&self, name: &str) -> usize {
        self.models
            .get(name)
            .map(|m| Arc::strong_count(m.value()) - 1)
            .unwrap_or(0)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl<M> Default for ModelRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}
