//! The repository façade.
//!
//! A [`Repository`] wraps one [`DataBackend`] behind a storage-agnostic API:
//! typed entities go in and out, mutations are staged locally and only reach
//! the backend on [`commit`], and unique retrieval enforces exactly-one
//! semantics. Swapping the backend changes where data lives, never how
//! calling code reads.
//!
//! [`commit`]: Repository::commit

mod cache;

use std::path::Path;

use tracing::{debug, info, warn};

use crate::backends::{BackendKind, DataBackend};
use crate::error::{RepositoryError, RepositoryResult};
use crate::model::{AttributeValue, EntityId, IdKind, Model, Record, ID_ATTRIBUTE};
use crate::query::{Criteria, ModelSelector};

use cache::IdentityCache;

/// One staged mutation, replayed against the backend on commit.
#[derive(Debug, Clone)]
enum StagedOp {
    Add(Record),
    Delete { model: String, id: EntityId },
}

/// Storage-agnostic persistence façade with staged mutations.
///
/// The repository is `Open` on construction. [`close`] flips it to `Closed`
/// permanently: every data method afterwards fails with
/// [`RepositoryError::Closed`].
///
/// [`close`]: Repository::close
#[derive(Debug)]
pub struct Repository {
    backend: Box<dyn DataBackend>,
    staged: Vec<StagedOp>,
    cache: IdentityCache,
    closed: bool,
}

impl Repository {
    /// Wraps the given backend.
    pub fn new(backend: impl DataBackend + 'static) -> Self {
        info!(backend = backend.name(), "repository ready");
        Self {
            backend: Box::new(backend),
            staged: Vec::new(),
            cache: IdentityCache::default(),
            closed: false,
        }
    }

    /// The storage technology behind this repository.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// How many staged mutations await [`commit`](Repository::commit).
    pub fn pending_count(&self) -> usize {
        self.staged.len()
    }

    fn ensure_open(&self) -> RepositoryResult<()> {
        if self.closed {
            return Err(RepositoryError::Closed);
        }
        Ok(())
    }

    /// Stages an entity for addition, assigning an id when unassigned.
    ///
    /// Returns the entity as staged, with its definitive id. Staging the
    /// same unchanged entity again is a no-op. Nothing reaches the backend
    /// until [`commit`](Repository::commit).
    pub fn add<M: Model>(&mut self, entity: M) -> RepositoryResult<M> {
        self.stage_add(entity, false)
    }

    /// Stages an entity, merging it into its stored counterpart first.
    ///
    /// The stored entity with the same identity (or, when the schema
    /// designates a merge key, the same key value) is fetched and the new
    /// attributes are folded into it; merge-skip attributes keep their
    /// stored value. Without a stored counterpart this behaves like
    /// [`add`](Repository::add).
    pub fn add_merged<M: Model>(&mut self, entity: M) -> RepositoryResult<M> {
        self.stage_add(entity, true)
    }

    /// Stages several entities in order.
    pub fn add_all<M: Model>(&mut self, entities: Vec<M>) -> RepositoryResult<Vec<M>> {
        entities.into_iter().map(|entity| self.add(entity)).collect()
    }

    fn stage_add<M: Model>(&mut self, entity: M, merge: bool) -> RepositoryResult<M> {
        self.ensure_open()?;
        let mut record = Record::from_model(&entity)?;

        if record.id().is_unassigned() {
            match record.schema().id_kind() {
                IdKind::Int => {
                    let next = self.next_int_id(record.model_name())?;
                    record.set_id(EntityId::Int(next));
                }
                kind @ IdKind::Str => {
                    return Err(RepositoryError::AutoIncrement {
                        model: record.model_name().to_string(),
                        kind: kind.name(),
                    })
                }
            }
        }

        if merge {
            if let Some(stored) = self.merge_target(&record)? {
                record = stored.merge(&record)?;
            }
        }

        if self.cache.unchanged(&record) {
            debug!(
                model = record.model_name(),
                id = %record.id(),
                "entity unchanged, skipping add"
            );
            return record.into_model();
        }

        debug!(model = record.model_name(), id = %record.id(), "staged add");
        self.cache.insert(&record);
        self.staged.push(StagedOp::Add(record.clone()));
        record.into_model()
    }

    /// The stored record an add-merge folds into, if any.
    fn merge_target(&mut self, record: &Record) -> RepositoryResult<Option<Record>> {
        let (attribute, value) = match record.schema().merge_key() {
            Some(key) => (key.to_string(), record.get(key).unwrap_or(AttributeValue::Null)),
            None => (ID_ATTRIBUTE.to_string(), id_value(record.id())),
        };
        let mut matches = self
            .backend
            .get(record.model_name(), &attribute, &value)?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches.remove(0))),
            count => Err(RepositoryError::MultipleFound {
                model: record.model_name().to_string(),
                attribute,
                value: value.to_string(),
                count,
            }),
        }
    }

    /// The next free integer id for a model: one past the highest id in the
    /// backend or the staging buffer, starting at 1.
    fn next_int_id(&mut self, model: &str) -> RepositoryResult<i64> {
        let mut highest = 0i64;
        for record in self.backend.all(&ModelSelector::named([model]))? {
            if let EntityId::Int(n) = record.id() {
                highest = highest.max(*n);
            }
        }
        for op in &self.staged {
            if let StagedOp::Add(record) = op {
                if record.model_name() == model {
                    if let EntityId::Int(n) = record.id() {
                        highest = highest.max(*n);
                    }
                }
            }
        }
        Ok(highest + 1)
    }

    /// Stages an entity for removal.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when the backend holds no entity with
    /// this identity.
    ///
    /// [`RepositoryError::NotFound`]: crate::error::RepositoryError::NotFound
    pub fn delete<M: Model>(&mut self, entity: &M) -> RepositoryResult<()> {
        self.ensure_open()?;
        let model = M::MODEL_NAME;
        let id = entity.id();
        let existing = self.backend.get(model, ID_ATTRIBUTE, &id_value(&id))?;
        if existing.is_empty() {
            return Err(RepositoryError::not_found(model, ID_ATTRIBUTE, &id));
        }
        let already_staged = self.staged.iter().any(|op| {
            matches!(op, StagedOp::Delete { model: staged_model, id: staged_id }
                if staged_model == model && staged_id == &id)
        });
        if already_staged {
            debug!(model, id = %id, "delete already staged, skipping");
            return Ok(());
        }
        debug!(model, id = %id, "staged delete");
        self.cache.remove(model, &id);
        self.staged.push(StagedOp::Delete {
            model: model.to_string(),
            id,
        });
        Ok(())
    }

    /// Retrieves the single entity with the given id.
    ///
    /// Reads committed state only; staged mutations are not visible.
    pub fn get<M: Model>(&mut self, id: impl Into<EntityId>) -> RepositoryResult<M> {
        let id = id.into();
        self.get_by::<M>(ID_ATTRIBUTE, id_value(&id))
    }

    /// Retrieves the single entity whose attribute equals the value.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] on zero matches,
    /// [`RepositoryError::MultipleFound`] on more than one.
    ///
    /// [`RepositoryError::NotFound`]: crate::error::RepositoryError::NotFound
    /// [`RepositoryError::MultipleFound`]: crate::error::RepositoryError::MultipleFound
    pub fn get_by<M: Model>(
        &mut self,
        attribute: &str,
        value: impl Into<AttributeValue>,
    ) -> RepositoryResult<M> {
        self.ensure_open()?;
        let value = value.into();
        let mut records = self.backend.get(M::MODEL_NAME, attribute, &value)?;
        match records.len() {
            0 => Err(RepositoryError::not_found(M::MODEL_NAME, attribute, &value)),
            1 => {
                let record = records.remove(0);
                self.cache.insert(&record);
                record.into_model()
            }
            count => Err(RepositoryError::MultipleFound {
                model: M::MODEL_NAME.to_string(),
                attribute: attribute.to_string(),
                value: value.to_string(),
                count,
            }),
        }
    }

    /// All committed entities of a model, id ascending.
    pub fn all<M: Model>(&mut self) -> RepositoryResult<Vec<M>> {
        self.all_records(&ModelSelector::one::<M>())?
            .iter()
            .map(Record::into_model)
            .collect()
    }

    /// All committed records of the selected models, id ascending.
    pub fn all_records(&mut self, models: &ModelSelector) -> RepositoryResult<Vec<Record>> {
        self.ensure_open()?;
        let records = self.backend.all(models)?;
        for record in &records {
            self.cache.insert(record);
        }
        Ok(records)
    }

    /// The committed entities of a model matching the criteria.
    ///
    /// Zero matches yield an empty vector, never an error.
    pub fn search<M: Model>(&mut self, criteria: impl Into<Criteria>) -> RepositoryResult<Vec<M>> {
        let records = self.search_records(criteria, &ModelSelector::one::<M>())?;
        records
            .iter()
            .filter(|record| record.model_name() == M::MODEL_NAME)
            .map(Record::into_model)
            .collect()
    }

    /// The committed records of the selected models matching the criteria.
    pub fn search_records(
        &mut self,
        criteria: impl Into<Criteria>,
        models: &ModelSelector,
    ) -> RepositoryResult<Vec<Record>> {
        self.ensure_open()?;
        let criteria = criteria.into();
        let records = self.backend.search(&criteria, models)?;
        for record in &records {
            self.cache.insert(record);
        }
        Ok(records)
    }

    /// The committed entity of a model with the lowest id.
    pub fn first<M: Model>(&mut self) -> RepositoryResult<M> {
        self.first_record(&ModelSelector::one::<M>())?.into_model()
    }

    /// The entity of a model with the highest id, staged adds included.
    pub fn last<M: Model>(&mut self) -> RepositoryResult<M> {
        self.last_record(&ModelSelector::one::<M>())?.into_model()
    }

    /// The committed record with the lowest id among the selected models.
    pub fn first_record(&mut self, models: &ModelSelector) -> RepositoryResult<Record> {
        let records = self.all_records(models)?;
        records
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::not_found(selector_label(models), ID_ATTRIBUTE, "any"))
    }

    /// The record with the highest id among the selected models.
    ///
    /// Unlike the other reads this one sees staged mutations too, so the
    /// answer stays correct while adds await commit.
    pub fn last_record(&mut self, models: &ModelSelector) -> RepositoryResult<Record> {
        let mut records = self.all_records(models)?;
        for op in &self.staged {
            match op {
                StagedOp::Add(record) if models.matches(record.model_name()) => {
                    match records.iter_mut().find(|r| **r == *record) {
                        Some(existing) => *existing = record.clone(),
                        None => records.push(record.clone()),
                    }
                }
                StagedOp::Delete { model, id } if models.matches(model) => {
                    records.retain(|r| !(r.model_name() == model && r.id() == id));
                }
                _ => {}
            }
        }
        records
            .into_iter()
            .max_by(|a, b| a.id().cmp(b.id()))
            .ok_or_else(|| RepositoryError::not_found(selector_label(models), ID_ATTRIBUTE, "any"))
    }

    /// Replays the staged mutations against the backend, in staging order.
    ///
    /// On failure the already-flushed prefix stays applied and the failing
    /// operation plus the unflushed tail remain staged.
    pub fn commit(&mut self) -> RepositoryResult<()> {
        self.ensure_open()?;
        let staged = std::mem::take(&mut self.staged);
        let total = staged.len();
        let mut pending = staged.into_iter();
        while let Some(op) = pending.next() {
            let result = match &op {
                StagedOp::Add(record) => self.backend.add(record),
                StagedOp::Delete { model, id } => self.backend.delete(model, id),
            };
            if let Err(error) = result {
                self.staged = std::iter::once(op).chain(pending).collect();
                warn!(
                    remaining = self.staged.len(),
                    "commit failed, keeping unflushed mutations staged"
                );
                return Err(error);
            }
        }
        debug!(mutations = total, "committed");
        Ok(())
    }

    /// Removes every entity from the backend, bypassing staging.
    ///
    /// Takes effect immediately and also discards all staged mutations and
    /// the identity cache.
    pub fn empty(&mut self) -> RepositoryResult<()> {
        self.ensure_open()?;
        self.backend.empty()?;
        self.staged.clear();
        self.cache.clear();
        info!(backend = self.backend.name(), "emptied repository");
        Ok(())
    }

    /// Applies the migration scripts in `directory` through the backend.
    pub fn apply_migrations(&mut self, directory: &Path) -> RepositoryResult<()> {
        self.ensure_open()?;
        self.backend.apply_migrations(directory)
    }

    /// Releases the backend. The repository stays closed permanently.
    ///
    /// Staged mutations that were never committed are discarded.
    pub fn close(&mut self) -> RepositoryResult<()> {
        if self.closed {
            return Ok(());
        }
        if !self.staged.is_empty() {
            warn!(
                pending = self.staged.len(),
                "closing repository with uncommitted mutations"
            );
        }
        self.backend.close()?;
        self.closed = true;
        Ok(())
    }

    /// Whether [`close`](Repository::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn selector_label(models: &ModelSelector) -> &str {
    models.single().unwrap_or("any model")
}

fn id_value(id: &EntityId) -> AttributeValue {
    match id {
        EntityId::Int(n) => AttributeValue::Int(*n),
        EntityId::Str(s) => AttributeValue::Str(s.clone()),
    }
}
