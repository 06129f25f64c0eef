//! Shared test infrastructure.
//!
//! Provides the fixture models and a constructor for one repository per
//! compiled-in backend, so behavioral tests can assert the same observable
//! semantics across every adapter.

#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use polystore::{
    EntityId, FieldKind, File, IdKind, MemoryBackend, Model, Repository, Schema, SchemaRegistry,
};

/// Fixture model with an optional attribute and a merge-skip rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id_: EntityId,
    pub name: String,
    pub country: Option<String>,
    pub rating: i64,
}

impl Author {
    pub fn new(name: &str, rating: i64) -> Self {
        Self {
            id_: EntityId::UNASSIGNED,
            name: name.to_string(),
            country: None,
            rating,
        }
    }
}

impl Model for Author {
    const MODEL_NAME: &'static str = "author";

    fn schema() -> Schema {
        Schema::builder("author")
            .field("name", FieldKind::Str)
            .optional_field("country", FieldKind::Str)
            .field("rating", FieldKind::Int)
            .skip_on_merge("rating")
            .build()
    }

    fn id(&self) -> EntityId {
        self.id_.clone()
    }

    fn set_id(&mut self, id: EntityId) {
        self.id_ = id;
    }
}

/// Fixture model carrying the `author_id` relation and a list attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id_: EntityId,
    pub title: String,
    pub author_id: i64,
    pub tags: Vec<String>,
}

impl Book {
    pub fn new(title: &str, author_id: i64, tags: &[&str]) -> Self {
        Self {
            id_: EntityId::UNASSIGNED,
            title: title.to_string(),
            author_id,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Model for Book {
    const MODEL_NAME: &'static str = "book";

    fn schema() -> Schema {
        Schema::builder("book")
            .field("title", FieldKind::Str)
            .field("author_id", FieldKind::Int)
            .field("tags", FieldKind::List(Box::new(FieldKind::Str)))
            .build()
    }

    fn id(&self) -> EntityId {
        self.id_.clone()
    }

    fn set_id(&mut self, id: EntityId) {
        self.id_ = id;
    }
}

/// Fixture model keyed by a string id (its url).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Website {
    pub id_: EntityId,
    pub title: String,
}

impl Website {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            id_: EntityId::Str(url.to_string()),
            title: title.to_string(),
        }
    }
}

impl Model for Website {
    const MODEL_NAME: &'static str = "website";

    fn schema() -> Schema {
        Schema::builder("website")
            .id_kind(IdKind::Str)
            .field("title", FieldKind::Str)
            .build()
    }

    fn id(&self) -> EntityId {
        self.id_.clone()
    }

    fn set_id(&mut self, id: EntityId) {
        self.id_ = id;
    }
}

/// Every model the behavioral tests persist.
pub fn registry() -> Arc<SchemaRegistry> {
    Arc::new(
        SchemaRegistry::new()
            .register::<Author>()
            .register::<Book>()
            .register::<File>()
            .register::<Website>(),
    )
}

/// One repository under test, keeping its storage alive for the test's
/// duration.
pub struct TestRepository {
    pub name: &'static str,
    pub repo: Repository,
    _dir: Option<tempfile::TempDir>,
}

/// A repository per compiled-in backend.
pub fn repositories() -> Vec<TestRepository> {
    let mut cases = vec![TestRepository {
        name: "memory",
        repo: Repository::new(MemoryBackend::new()),
        _dir: None,
    }];

    #[cfg(feature = "document")]
    {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend =
            polystore::DocumentBackend::open(dir.path().join("collection.json"), registry())
                .expect("document backend");
        cases.push(TestRepository {
            name: "document",
            repo: Repository::new(backend),
            _dir: Some(dir),
        });
    }

    #[cfg(feature = "relational")]
    {
        let backend = polystore::SqliteBackend::in_memory(registry()).expect("sqlite backend");
        cases.push(TestRepository {
            name: "relational",
            repo: Repository::new(backend),
            _dir: None,
        });
    }

    cases
}
