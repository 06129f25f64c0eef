//! Backend adapters.
//!
//! The [`DataBackend`] trait is the capability contract every storage
//! technology implements; the repository is composed with one through
//! dependency injection and never sees backend internals. Three adapters are
//! provided: [`memory`], [`document`] (JSON-file collection), and
//! [`relational`] (SQLite).

use std::cmp::Ordering;
use std::fmt::Debug;
use std::path::Path;

use crate::error::RepositoryResult;
use crate::model::{AttributeValue, EntityId, Record};
use crate::query::{relation_attribute, Combinator, Condition, Criteria, ModelSelector, Query, SortKey};

pub mod memory;

#[cfg(feature = "document")]
pub mod document;

#[cfg(feature = "relational")]
pub mod relational;

pub use memory::MemoryBackend;

#[cfg(feature = "document")]
pub use document::DocumentBackend;

#[cfg(feature = "relational")]
pub use relational::SqliteBackend;

/// Identifies the storage technology behind a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Volatile in-process store.
    Memory,
    /// JSON-file document collection.
    Document,
    /// SQLite relational database.
    Relational,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Document => write!(f, "document"),
            BackendKind::Relational => write!(f, "relational"),
        }
    }
}

/// The contract every storage backend implements.
///
/// All operations are synchronous and scoped to entity models; the staged
/// mutation buffer lives in the repository, so `add` and `delete` here take
/// effect immediately. Implementations translate [`Criteria`] into their
/// native filtering and materialize rows back into [`Record`]s.
pub trait DataBackend: Send + Debug {
    /// The storage technology of this backend.
    fn kind(&self) -> BackendKind;

    /// Short name used in log and error messages.
    fn name(&self) -> &'static str;

    /// Inserts or overwrites the row identified by the record's model and id.
    ///
    /// Idempotent: adding the same record twice leaves a single stored row.
    fn add(&mut self, record: &Record) -> RepositoryResult<()>;

    /// Removes the row matching `(model, id)`.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when no such row exists.
    ///
    /// [`RepositoryError::NotFound`]: crate::error::RepositoryError::NotFound
    fn delete(&mut self, model: &str, id: &EntityId) -> RepositoryResult<()>;

    /// Returns every record of `model` whose `attribute` equals `value`.
    ///
    /// The identity is addressable as `id_`. Matching is exact; uniqueness
    /// is enforced by the repository on top of this.
    fn get(
        &mut self,
        model: &str,
        attribute: &str,
        value: &AttributeValue,
    ) -> RepositoryResult<Vec<Record>>;

    /// Returns all records of the selected models, sorted by id ascending.
    fn all(&mut self, models: &ModelSelector) -> RepositoryResult<Vec<Record>>;

    /// Returns the records matching the criteria, sorted and limited per the
    /// query. Zero matches yield an empty vector, never an error.
    fn search(
        &mut self,
        criteria: &Criteria,
        models: &ModelSelector,
    ) -> RepositoryResult<Vec<Record>>;

    /// Applies the migration scripts in `directory`.
    ///
    /// A no-op for schema-less backends.
    fn apply_migrations(&mut self, directory: &Path) -> RepositoryResult<()>;

    /// Unconditionally removes every row of every model, effective
    /// immediately.
    fn empty(&mut self) -> RepositoryResult<()>;

    /// Releases the underlying storage handle.
    fn close(&mut self) -> RepositoryResult<()>;

    /// Whether the storage handle has been released.
    fn is_closed(&self) -> bool;
}

/// Compares two records by the given sort keys, then by id and model name.
pub(crate) fn compare_records(a: &Record, b: &Record, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.get(&key.attribute).unwrap_or(AttributeValue::Null);
        let right = b.get(&key.attribute).unwrap_or(AttributeValue::Null);
        let ordering = if key.reverse {
            right.compare(&left)
        } else {
            left.compare(&right)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.id()
        .cmp(b.id())
        .then_with(|| a.model_name().cmp(b.model_name()))
}

/// Stable-sorts records by the sort keys, defaulting to id ascending.
pub(crate) fn sort_records(records: &mut [Record], keys: &[SortKey]) {
    records.sort_by(|a, b| compare_records(a, b, keys));
}

/// Truncates the result set to the query's limit, if any.
pub(crate) fn apply_limit(records: &mut Vec<Record>, limit: Option<i64>) {
    if let Some(limit) = limit {
        records.truncate(limit.max(0) as usize);
    }
}

/// Executes a query given a backend-native fetch of one condition group.
///
/// The backend translates the base condition group into its native
/// predicates through `fetch`; logical composition is then resolved as set
/// operations over the identity-equal result sets, which keeps OR/AND/JOIN
/// semantics identical on every backend. Results are sorted and limited
/// before returning.
pub(crate) fn execute_query<F>(query: &Query, fetch: &mut F) -> RepositoryResult<Vec<Record>>
where
    F: FnMut(&ModelSelector, &[Condition]) -> RepositoryResult<Vec<Record>>,
{
    let mut results = fetch(query.models(), query.conditions())?;

    for (combinator, sub) in query.compositions() {
        let sub_results = execute_query(sub, fetch)?;
        match combinator {
            Combinator::Or => {
                for record in sub_results {
                    if !results.contains(&record) {
                        results.push(record);
                    }
                }
            }
            Combinator::And => {
                results.retain(|record| sub_results.contains(record));
            }
            Combinator::Join => {
                // Validated upfront: both sides name a single model.
                let parent_model = query.models().single().unwrap_or_default();
                let relation = relation_attribute(parent_model);
                results.retain(|parent| {
                    let parent_id = parent.get(crate::model::ID_ATTRIBUTE);
                    sub_results
                        .iter()
                        .any(|child| child.get(&relation) == parent_id)
                });
            }
        }
    }

    sort_records(&mut results, query.sort_keys());
    apply_limit(&mut results, query.limit_count());
    Ok(results)
}
