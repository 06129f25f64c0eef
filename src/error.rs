//! Error types for the repository layer.
//!
//! This module defines all error types used throughout the crate, organized as
//! a hierarchy: [`RepositoryError`] is the primary type returned by the public
//! surface, wrapping the more specific validation, merge, query, and backend
//! errors transparently.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// The primary error type for all repository operations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Attribute values did not match the declared schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The requested entity does not exist.
    #[error("no {model} entity found where {attribute} is {value}")]
    NotFound {
        model: String,
        attribute: String,
        value: String,
    },

    /// A lookup expected to be unique matched more than one entity.
    #[error("{count} {model} entities found where {attribute} is {value}, expected exactly one")]
    MultipleFound {
        model: String,
        attribute: String,
        value: String,
        count: usize,
    },

    /// Two entities could not be merged.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// The query is malformed and was rejected before execution.
    #[error(transparent)]
    InvalidQuery(#[from] InvalidQueryError),

    /// Automatic id assignment is only available for integer ids.
    #[error("cannot auto-increment ids of model {model}: its ids are {kind}, set the id before adding")]
    AutoIncrement { model: String, kind: &'static str },

    /// The storage could not be reached when opening the backend.
    #[error("could not connect to the {backend} store at {target}: {message}")]
    Connection {
        backend: &'static str,
        target: String,
        message: String,
    },

    /// A data method was called after `close`.
    #[error("the repository is closed")]
    Closed,

    /// An error surfaced by the storage backend.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl RepositoryError {
    /// Builds a [`RepositoryError::NotFound`] for the given lookup.
    pub fn not_found(
        model: impl Into<String>,
        attribute: impl Into<String>,
        value: impl fmt::Display,
    ) -> Self {
        RepositoryError::NotFound {
            model: model.into(),
            attribute: attribute.into(),
            value: value.to_string(),
        }
    }

    /// Returns true if this error is an entity-not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

#[cfg(feature = "relational")]
impl From<rusqlite::Error> for RepositoryError {
    fn from(error: rusqlite::Error) -> Self {
        RepositoryError::Backend(BackendError::Sql(error))
    }
}

/// One or more attribute values did not match the declared schema.
///
/// Reports every offending field, not just the first one found.
#[derive(Error, Debug)]
pub struct ValidationError {
    /// The model whose schema was violated.
    pub model: String,
    /// Every field that failed validation.
    pub fields: Vec<FieldError>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} entity:", self.model)?;
        for field in &self.fields {
            write!(f, " [{}: {}]", field.field, field.message)?;
        }
        Ok(())
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The attribute name.
    pub field: String,
    /// What was wrong with the value.
    pub message: String,
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised when merging two entities.
#[derive(Error, Debug)]
pub enum MergeError {
    /// The entities belong to different models.
    #[error("cannot merge a {incoming} entity into a {target} entity")]
    ModelMismatch { target: String, incoming: String },

    /// The entities carry different identities (or merge-key values).
    #[error("cannot merge {model} entities whose {attribute} differs: {target} vs {incoming}")]
    IdentityMismatch {
        model: String,
        attribute: String,
        target: String,
        incoming: String,
    },
}

/// Errors raised when a query is structurally invalid.
///
/// These are surfaced before any backend work happens.
#[derive(Error, Debug)]
pub enum InvalidQueryError {
    /// `limit` was called with a negative count.
    #[error("query limit must be zero or positive, got {limit}")]
    NegativeLimit { limit: i64 },

    /// `join` needs a single concrete model on each side to derive the
    /// relation attribute.
    #[error("join requires a single target model on each side of the relation")]
    JoinWithoutModel,
}

/// Errors originating inside a storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Filesystem error while reading or writing the store.
    #[error("i/o error in the {backend} store: {source}")]
    Io {
        backend: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// SQL execution error.
    #[cfg(feature = "relational")]
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// A stored row could not be encoded or decoded.
    #[error("serialization error in the {backend} store: {message}")]
    Serialization {
        backend: &'static str,
        message: String,
    },

    /// A migration script failed to apply.
    #[error("migration {name} failed: {message}")]
    Migration { name: String, message: String },

    /// An operation was attempted on a closed backend.
    #[error("the {backend} store is closed")]
    Closed { backend: &'static str },

    /// A row referenced a model that is not in the schema registry.
    #[error("model {model} is not registered")]
    UnknownModel { model: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_field() {
        let error = ValidationError {
            model: "author".to_string(),
            fields: vec![
                FieldError::new("name", "expected a string"),
                FieldError::new("age", "expected an integer"),
            ],
        };

        let message = error.to_string();
        assert!(message.contains("name: expected a string"));
        assert!(message.contains("age: expected an integer"));
    }

    #[test]
    fn test_not_found_constructor() {
        let error = RepositoryError::not_found("book", "id_", 7);
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "no book entity found where id_ is 7");
    }

    #[test]
    fn test_merge_error_display() {
        let error = MergeError::ModelMismatch {
            target: "author".to_string(),
            incoming: "book".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "cannot merge a book entity into a author entity"
        );
    }
}
