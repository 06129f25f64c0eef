//! Document backend: a JSON-file collection.
//!
//! All models share a single collection file holding a JSON array of
//! documents. Each document carries the entity attributes plus two hidden
//! fields: the identity under `id_` and the model discriminator under
//! `model_type_`. Both are stripped before a document is handed back as a
//! [`Record`], so callers never see storage bookkeeping.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::RegexBuilder;
use tracing::{debug, info};

use crate::backends::{execute_query, sort_records, BackendKind, DataBackend};
use crate::error::{BackendError, RepositoryError, RepositoryResult};
use crate::model::{AttributeValue, EntityId, Record, SchemaRegistry, ID_ATTRIBUTE};
use crate::query::{Condition, Criteria, ModelSelector};

/// Hidden document field carrying the model discriminator.
const MODEL_TYPE_ATTRIBUTE: &str = "model_type_";

type Document = serde_json::Map<String, serde_json::Value>;

/// JSON-file document backend.
///
/// The collection is kept in memory and rewritten to disk on every mutation,
/// so a crash between mutations never leaves a half-written document behind
/// more than the last write.
#[derive(Debug)]
pub struct DocumentBackend {
    path: PathBuf,
    registry: Arc<SchemaRegistry>,
    documents: Vec<Document>,
    closed: bool,
}

impl DocumentBackend {
    /// Opens the collection file, creating it when missing.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Connection`] when the file cannot be created, for
    /// example because the parent directory does not exist.
    ///
    /// [`RepositoryError::Connection`]: crate::error::RepositoryError::Connection
    pub fn open(path: impl Into<PathBuf>, registry: Arc<SchemaRegistry>) -> RepositoryResult<Self> {
        let path = path.into();
        let documents = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| BackendError::Io {
                backend: "document",
                source,
            })?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| BackendError::Serialization {
                    backend: "document",
                    message: format!("{}: {}", path.display(), e),
                })?
            }
        } else {
            std::fs::write(&path, "[]").map_err(|e| RepositoryError::Connection {
                backend: "document",
                target: path.display().to_string(),
                message: e.to_string(),
            })?;
            Vec::new()
        };
        info!(path = %path.display(), documents = documents.len(), "opened document collection");
        Ok(Self {
            path,
            registry,
            documents,
            closed: false,
        })
    }

    fn ensure_open(&self) -> RepositoryResult<()> {
        if self.closed {
            return Err(BackendError::Closed { backend: "document" }.into());
        }
        Ok(())
    }

    fn persist(&self) -> RepositoryResult<()> {
        let raw =
            serde_json::to_string_pretty(&self.documents).map_err(|e| BackendError::Serialization {
                backend: "document",
                message: e.to_string(),
            })?;
        std::fs::write(&self.path, raw).map_err(|source| {
            BackendError::Io {
                backend: "document",
                source,
            }
            .into()
        })
    }

    /// The model names a selector covers in this collection.
    fn selected_models(&self, models: &ModelSelector) -> Vec<String> {
        match models {
            ModelSelector::All => self.registry.model_names(),
            ModelSelector::Models(names) => names.clone(),
        }
    }

    fn encode(record: &Record) -> RepositoryResult<Document> {
        let mut document = record.to_json_object();
        document.insert(
            ID_ATTRIBUTE.to_string(),
            serde_json::to_value(record.id()).map_err(|e| BackendError::Serialization {
                backend: "document",
                message: e.to_string(),
            })?,
        );
        document.insert(
            MODEL_TYPE_ATTRIBUTE.to_string(),
            serde_json::Value::String(record.model_name().to_string()),
        );
        Ok(document)
    }

    fn decode(&self, document: &Document) -> RepositoryResult<Record> {
        let model = document_model(document).ok_or(BackendError::Serialization {
            backend: "document",
            message: "document without model discriminator".to_string(),
        })?;
        let schema = self
            .registry
            .get(model)
            .ok_or_else(|| BackendError::UnknownModel {
                model: model.to_string(),
            })?;
        let id: EntityId = document
            .get(ID_ATTRIBUTE)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| BackendError::Serialization {
                backend: "document",
                message: format!("invalid document id: {}", e),
            })?
            .unwrap_or_default();
        let mut attributes = document.clone();
        attributes.remove(ID_ATTRIBUTE);
        attributes.remove(MODEL_TYPE_ATTRIBUTE);
        Record::from_json(schema, id, &attributes)
    }

    fn position(&self, model: &str, id: &serde_json::Value) -> Option<usize> {
        self.documents.iter().position(|document| {
            document_model(document) == Some(model) && document.get(ID_ATTRIBUTE) == Some(id)
        })
    }
}

impl DataBackend for DocumentBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn name(&self) -> &'static str {
        "document"
    }

    fn add(&mut self, record: &Record) -> RepositoryResult<()> {
        self.ensure_open()?;
        let document = Self::encode(record)?;
        let id = document
            .get(ID_ATTRIBUTE)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        match self.position(record.model_name(), &id) {
            Some(index) => self.documents[index] = document,
            None => self.documents.push(document),
        }
        self.persist()
    }

    fn delete(&mut self, model: &str, id: &EntityId) -> RepositoryResult<()> {
        self.ensure_open()?;
        let id_json = serde_json::to_value(id).map_err(|e| BackendError::Serialization {
            backend: "document",
            message: e.to_string(),
        })?;
        match self.position(model, &id_json) {
            Some(index) => {
                self.documents.remove(index);
                self.persist()
            }
            None => Err(RepositoryError::not_found(model, ID_ATTRIBUTE, id)),
        }
    }

    fn get(
        &mut self,
        model: &str,
        attribute: &str,
        value: &AttributeValue,
    ) -> RepositoryResult<Vec<Record>> {
        self.ensure_open()?;
        if self.registry.get(model).is_none() {
            return Err(BackendError::UnknownModel {
                model: model.to_string(),
            }
            .into());
        }
        let expected = value.to_json();
        let mut results = Vec::new();
        for document in &self.documents {
            if document_model(document) != Some(model) {
                continue;
            }
            let matches = document
                .get(attribute)
                .map(|candidate| json_equal(candidate, &expected))
                .unwrap_or(false);
            if matches {
                results.push(self.decode(document)?);
            }
        }
        sort_records(&mut results, &[]);
        Ok(results)
    }

    fn all(&mut self, models: &ModelSelector) -> RepositoryResult<Vec<Record>> {
        self.ensure_open()?;
        let selected = self.selected_models(models);
        let mut results = Vec::new();
        for document in &self.documents {
            if let Some(model) = document_model(document) {
                if selected.iter().any(|name| name == model) {
                    results.push(self.decode(document)?);
                }
            }
        }
        sort_records(&mut results, &[]);
        Ok(results)
    }

    fn search(
        &mut self,
        criteria: &Criteria,
        models: &ModelSelector,
    ) -> RepositoryResult<Vec<Record>> {
        self.ensure_open()?;
        criteria.validate()?;
        match criteria {
            Criteria::Filter(filter) => {
                // A multi-value filter is a conjunction of field predicates
                // evaluated directly on the stored documents.
                let selected = self.selected_models(models);
                let mut results = Vec::new();
                for document in &self.documents {
                    let Some(model) = document_model(document) else {
                        continue;
                    };
                    if !selected.iter().any(|name| name == model) {
                        continue;
                    }
                    let matches = filter.iter().all(|(attribute, expected)| {
                        document
                            .get(attribute.as_str())
                            .map(|candidate| fuzzy_json_matches(candidate, expected))
                            .unwrap_or(false)
                    });
                    if matches {
                        results.push(self.decode(document)?);
                    }
                }
                sort_records(&mut results, &[]);
                Ok(results)
            }
            Criteria::Query(query) => {
                // Condition groups run over decoded records so operator
                // semantics stay identical to the other adapters.
                let mut decoded: Vec<Record> = Vec::new();
                for document in &self.documents {
                    if let Some(model) = document_model(document) {
                        if self.registry.get(model).is_some() {
                            decoded.push(self.decode(document)?);
                        }
                    }
                }
                execute_query(query, &mut |selector: &ModelSelector,
                                           conditions: &[Condition]| {
                    let selector = selector.resolve(models);
                    Ok(decoded
                        .iter()
                        .filter(|record| {
                            selector.matches(record.model_name())
                                && conditions.iter().all(|condition| {
                                    match record.get(&condition.attribute) {
                                        Some(candidate) => condition
                                            .operator
                                            .evaluate(&candidate, &condition.value),
                                        None => false,
                                    }
                                })
                        })
                        .cloned()
                        .collect())
                })
            }
        }
    }

    fn apply_migrations(&mut self, directory: &Path) -> RepositoryResult<()> {
        self.ensure_open()?;
        debug!(directory = %directory.display(), "document backend is schema-less, skipping migrations");
        Ok(())
    }

    fn empty(&mut self) -> RepositoryResult<()> {
        self.ensure_open()?;
        self.documents.clear();
        self.persist()
    }

    fn close(&mut self) -> RepositoryResult<()> {
        if !self.closed {
            self.persist()?;
            self.closed = true;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

fn document_model(document: &Document) -> Option<&str> {
    document.get(MODEL_TYPE_ATTRIBUTE).and_then(|v| v.as_str())
}

/// Exact JSON equality; an array candidate against a scalar means contains.
fn json_equal(candidate: &serde_json::Value, expected: &serde_json::Value) -> bool {
    match candidate {
        serde_json::Value::Array(items) if !expected.is_array() => {
            items.iter().any(|item| item == expected)
        }
        candidate => candidate == expected,
    }
}

/// Fuzzy document-field predicate mirroring the in-memory filter matching.
fn fuzzy_json_matches(candidate: &serde_json::Value, expected: &AttributeValue) -> bool {
    match (candidate, expected) {
        (serde_json::Value::Array(items), expected)
            if !matches!(expected, AttributeValue::List(_)) =>
        {
            items.iter().any(|item| fuzzy_json_matches(item, expected))
        }
        (serde_json::Value::String(text), AttributeValue::Str(pattern)) => {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => regex.is_match(text),
                Err(_) => text.to_lowercase().contains(&pattern.to_lowercase()),
            }
        }
        (candidate, expected) => json_equal(candidate, &expected.to_json()),
    }
}
