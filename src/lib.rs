//! Polystore: a storage-agnostic persistence layer.
//!
//! Domain code talks to a [`Repository`] in terms of typed entities, chained
//! [`Query`] values, and attribute [`Filter`]s; where the data actually
//! lives is decided once, when the repository is composed with a backend.
//! Swapping SQLite for a JSON document collection or an in-memory store is a
//! one-line change at the composition root.
//!
//! # Features
//!
//! - **Interchangeable backends**: in-memory (always available), JSON
//!   document collection (`document`, default), SQLite (`relational`,
//!   default)
//! - **Staged mutations**: adds and deletes buffer locally and reach storage
//!   only on [`Repository::commit`]
//! - **Auto-increment ids**: integer identities are assigned on add, aware
//!   of both committed and staged entities
//! - **Merge adds**: fold new attribute state into the stored entity,
//!   honoring per-model merge-skip rules
//! - **File content**: byte blobs flow through the narrow
//!   [`FileStore`](files::FileStore) contract, separate from entity metadata
//!
//! # Architecture
//!
//! - [`model`] - entity identities, attribute values, schemas, and the
//!   typed/dynamic record split
//! - [`query`] - backend-neutral queries, filters, and criteria
//! - [`backends`] - the [`DataBackend`] contract and its three adapters
//! - [`repository`] - the staging façade everything above composes into
//! - [`files`] - byte-blob storage for file entities
//! - [`error`] - error types for all operations
//!
//! # Quick start
//!
//! ```
//! use polystore::{
//!     EntityId, FieldKind, MemoryBackend, Model, Query, Repository, Schema,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Task {
//!     id_: EntityId,
//!     description: String,
//!     priority: i64,
//! }
//!
//! impl Model for Task {
//!     const MODEL_NAME: &'static str = "task";
//!
//!     fn schema() -> Schema {
//!         Schema::builder("task")
//!             .field("description", FieldKind::Str)
//!             .field("priority", FieldKind::Int)
//!             .build()
//!     }
//!
//!     fn id(&self) -> EntityId {
//!         self.id_.clone()
//!     }
//!
//!     fn set_id(&mut self, id: EntityId) {
//!         self.id_ = id;
//!     }
//! }
//!
//! # fn main() -> polystore::RepositoryResult<()> {
//! let mut repo = Repository::new(MemoryBackend::new());
//!
//! let task = repo.add(Task {
//!     id_: EntityId::UNASSIGNED,
//!     description: "water the plants".to_string(),
//!     priority: 3,
//! })?;
//! assert_eq!(task.id_, EntityId::Int(1));
//! repo.commit()?;
//!
//! let urgent: Vec<Task> = repo.search(
//!     Query::model::<Task>().greater(("priority", 2i64)).sort("priority", true),
//! )?;
//! assert_eq!(urgent.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Backends
//!
//! The document and relational adapters materialize rows through a shared
//! [`SchemaRegistry`] holding every model the store may contain:
//!
//! ```no_run
//! use std::sync::Arc;
//! use polystore::{Repository, SchemaRegistry, SqliteBackend};
//! # use polystore::{EntityId, FieldKind, Model, Schema};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Debug, Clone, Serialize, Deserialize)]
//! # struct Task { id_: EntityId, description: String }
//! # impl Model for Task {
//! #     const MODEL_NAME: &'static str = "task";
//! #     fn schema() -> Schema {
//! #         Schema::builder("task").field("description", FieldKind::Str).build()
//! #     }
//! #     fn id(&self) -> EntityId { self.id_.clone() }
//! #     fn set_id(&mut self, id: EntityId) { self.id_ = id; }
//! # }
//!
//! # fn main() -> polystore::RepositoryResult<()> {
//! let registry = Arc::new(SchemaRegistry::new().register::<Task>());
//! let repo = Repository::new(SqliteBackend::open("tasks.db", registry)?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod error;
pub mod files;
pub mod model;
pub mod query;
pub mod repository;

// Re-export commonly used types at crate root
pub use error::{
    BackendError, FieldError, InvalidQueryError, MergeError, RepositoryError, RepositoryResult,
    ValidationError,
};
pub use model::{
    AttributeValue, EntityId, FieldDescriptor, FieldKind, File, IdKind, Model, Record, Schema,
    SchemaBuilder, SchemaRegistry, ID_ATTRIBUTE,
};
pub use query::{Comparison, Criteria, Filter, ModelSelector, Query, SortKey};
pub use repository::Repository;

// Re-export the backend contract and adapters
pub use backends::{BackendKind, DataBackend, MemoryBackend};

#[cfg(feature = "document")]
pub use backends::DocumentBackend;

#[cfg(feature = "relational")]
pub use backends::SqliteBackend;

pub use files::{FileStore, LocalFileStore};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
