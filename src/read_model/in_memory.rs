//! HashMap-backed read model store for tests and single-process use.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use super::{ReadModel, ReadModelError, ReadModelStore, Versioned};

struct StoredModel {
    json: Value,
    version: u64,
}

/// In-memory read model store.
///
/// Models are kept as JSON under the key `"<collection>:<id>"`. Clones share
/// the same storage.
#[derive(Clone, Default)]
pub struct InMemoryReadModelStore {
    storage: Arc<RwLock<BTreeMap<String, StoredModel>>>,
}

impl InMemoryReadModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored models across all collections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn key(collection: &str, id: &str) -> String {
        format!("{}:{}", collection, id)
    }

    // Writers never run user code while holding the lock.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredModel>> {
        self.storage
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredModel>> {
        self.storage
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn decode<M: ReadModel>(stored: &StoredModel) -> Result<Versioned<M>, ReadModelError> {
    let data = serde_json::from_value(stored.json.clone())
        .map_err(|e| ReadModelError::Serde(e.to_string()))?;
    Ok(Versioned {
        data,
        version: stored.version,
    })
}

impl ReadModelStore for InMemoryReadModelStore {
    fn get_model<M: ReadModel>(&self, id: &str) -> Result<Option<Versioned<M>>, ReadModelError> {
        let key = Self::key(M::COLLECTION, id);
        self.read().get(&key).map(decode::<M>).transpose()
    }

    fn upsert<M: ReadModel>(&self, model: &M) -> Result<Versioned<M>, ReadModelError> {
        let key = Self::key(M::COLLECTION, model.id());
        let json = serde_json::to_value(model).map_err(|e| ReadModelError::Serde(e.to_string()))?;

        let mut storage = self.write();
        let version = storage.get(&key).map_or(1, |s| s.version + 1);
        storage.insert(key, StoredModel { json, version });

        Ok(Versioned {
            data: model.clone(),
            version,
        })
    }

    fn delete<M: ReadModel>(&self, id: &str) -> Result<bool, ReadModelError> {
        let key = Self::key(M::COLLECTION, id);
        Ok(self.write().remove(&key).is_some())
    }

    fn find_models<M: ReadModel>(
        &self,
        predicate: &dyn Fn(&M) -> bool,
    ) -> Result<Vec<Versioned<M>>, ReadModelError> {
        let prefix = format!("{}:", M::COLLECTION);

        // Decode under the lock, filter after releasing it.
        let decoded = self
            .read()
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(_, stored)| decode::<M>(stored))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(decoded.into_iter().filter(|v| predicate(&v.data)).collect())
    }
}
