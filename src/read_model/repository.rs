use std::marker::PhantomData;

use super::{ReadModel, ReadModelError, ReadModelStore, Versioned};

/// Typed view of one read model collection in a store.
pub struct ReadModelRepository<'a, S, M> {
    store: &'a S,
    _marker: PhantomData<M>,
}

impl<'a, S: ReadModelStore, M: ReadModel> ReadModelRepository<'a, S, M> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// The model stored under `id`, without its version.
    pub fn find(&self, id: &str) -> Result<Option<M>, ReadModelError> {
        Ok(self.store.get_model::<M>(id)?.map(|v| v.data))
    }

    /// The model stored under `id`, failing if it is absent.
    pub fn get(&self, id: &str) -> Result<Versioned<M>, ReadModelError> {
        self.store
            .get_model::<M>(id)?
            .ok_or_else(|| ReadModelError::NotFound {
                collection: M::COLLECTION.to_string(),
                id: id.to_string(),
            })
    }

    pub fn save(&self, model: &M) -> Result<Versioned<M>, ReadModelError> {
        self.store.upsert(model)
    }

    pub fn delete(&self, id: &str) -> Result<bool, ReadModelError> {
        self.store.delete::<M>(id)
    }

    /// Every model of the collection, ordered by id.
    pub fn all(&self) -> Result<Vec<M>, ReadModelError> {
        self.filter(&|_| true)
    }

    pub fn filter(&self, predicate: &dyn Fn(&M) -> bool) -> Result<Vec<M>, ReadModelError> {
        Ok(self
            .store
            .find_models(predicate)?
            .into_iter()
            .map(|v| v.data)
            .collect())
    }
}

/// Extension trait for typed read model access on any [`ReadModelStore`].
pub trait ReadModelsExt: ReadModelStore + Sized {
    fn read_models<M: ReadModel>(&self) -> ReadModelRepository<'_, Self, M> {
        ReadModelRepository::new(self)
    }
}

impl<S: ReadModelStore> ReadModelsExt for S {}
