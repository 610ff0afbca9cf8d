//! Read models - query-side views kept up to date by projectors.
//!
//! A read model is a plain serde record stored under a collection name and
//! an id. Projectors registered on the bus turn events into upserts against
//! a [`ReadModelStore`].
//!
//! ## Example
//!
//! ```ignore
//! use sourced_bus::{InMemoryReadModelStore, ReadModel, ReadModelsExt};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, ReadModel)]
//! #[readmodel(collection = "invitations")]
//! struct Invitation {
//!     #[readmodel(id)]
//!     pub id: String,
//!     pub status: String,
//! }
//!
//! let store = InMemoryReadModelStore::new();
//! store.read_models::<Invitation>().save(&invitation)?;
//! let loaded = store.read_models::<Invitation>().find("abc")?;
//! ```

mod in_memory;
mod repository;
mod store;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub use in_memory::InMemoryReadModelStore;
pub use repository::{ReadModelRepository, ReadModelsExt};
pub use store::ReadModelStore;

/// Trait for types that can be stored as read models.
pub trait ReadModel: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Collection name for this read model type (e.g. "invitations").
    /// Maps to a table in SQL, a collection in MongoDB, a key prefix in KV stores.
    const COLLECTION: &'static str;

    /// Unique identifier of this instance within its collection.
    fn id(&self) -> &str;
}

/// Read model data with the store's version counter.
///
/// The version starts at 1 and increments on every save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64,
}

/// Error type for read model store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadModelError {
    #[error("read model serialization error: {0}")]
    Serde(String),
    #[error("read model storage error: {0}")]
    Storage(String),
    #[error("read model not found: {collection}:{id}")]
    NotFound { collection: String, id: String },
}
