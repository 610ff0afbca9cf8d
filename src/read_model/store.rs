use super::{ReadModel, ReadModelError, Versioned};

/// Abstract CRUD storage for read models.
///
/// Method names carry a `_model` suffix where a short name would read
/// ambiguously on a generic store; [`ReadModelRepository`](super::ReadModelRepository)
/// offers short names per model type.
pub trait ReadModelStore: Send + Sync {
    /// Get a read model by id. Returns `None` if not found.
    fn get_model<M: ReadModel>(&self, id: &str) -> Result<Option<Versioned<M>>, ReadModelError>;

    /// Insert or replace a read model, bumping its version.
    fn upsert<M: ReadModel>(&self, model: &M) -> Result<Versioned<M>, ReadModelError>;

    /// Delete a read model by id. Returns `true` if it existed.
    fn delete<M: ReadModel>(&self, id: &str) -> Result<bool, ReadModelError>;

    /// Every read model of the collection matching `predicate`, ordered by id.
    fn find_models<M: ReadModel>(
        &self,
        predicate: &dyn Fn(&M) -> bool,
    ) -> Result<Vec<Versioned<M>>, ReadModelError>;
}
