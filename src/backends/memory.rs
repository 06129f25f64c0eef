//! Volatile in-process backend.
//!
//! The reference implementation of the backend contract: every other adapter
//! must be observationally equivalent to this one. Records live in plain
//! per-model vectors and all matching is a linear scan, which also makes it
//! the natural test double for code built on top of the repository.

use std::collections::HashMap;
use std::path::Path;

use regex::RegexBuilder;
use tracing::debug;

use crate::backends::{execute_query, sort_records, BackendKind, DataBackend};
use crate::error::{BackendError, RepositoryError, RepositoryResult};
use crate::model::{AttributeValue, EntityId, Record, ID_ATTRIBUTE};
use crate::query::{Comparison, Condition, Criteria, Filter, ModelSelector};

/// In-memory backend: per-model vectors of records, nothing persisted.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entities: HashMap<String, Vec<Record>>,
    closed: bool,
}

impl MemoryBackend {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> RepositoryResult<()> {
        if self.closed {
            return Err(BackendError::Closed { backend: "memory" }.into());
        }
        Ok(())
    }

    fn scan(
        &self,
        models: &ModelSelector,
        predicate: impl Fn(&Record) -> bool,
    ) -> Vec<Record> {
        let mut results = Vec::new();
        for (model, records) in &self.entities {
            if !models.matches(model) {
                continue;
            }
            results.extend(records.iter().filter(|r| predicate(r)).cloned());
        }
        results
    }
}

impl DataBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn add(&mut self, record: &Record) -> RepositoryResult<()> {
        self.ensure_open()?;
        let records = self
            .entities
            .entry(record.model_name().to_string())
            .or_default();
        match records.iter_mut().find(|r| r.id() == record.id()) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    fn delete(&mut self, model: &str, id: &EntityId) -> RepositoryResult<()> {
        self.ensure_open()?;
        let position = self
            .entities
            .get(model)
            .and_then(|records| records.iter().position(|r| r.id() == id));
        match position {
            Some(index) => {
                self.entities
                    .get_mut(model)
                    .map(|records| records.remove(index));
                Ok(())
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
        let selector = ModelSelector::named([model]);
        let mut results = self.scan(&selector, |record| match record.get(attribute) {
            Some(candidate) => Comparison::Equal.evaluate(&candidate, value),
            None => false,
        });
        sort_records(&mut results, &[]);
        Ok(results)
    }

    fn all(&mut self, models: &ModelSelector) -> RepositoryResult<Vec<Record>> {
        self.ensure_open()?;
        let mut results = self.scan(models, |_| true);
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
                let mut results = self.scan(models, |record| filter_matches(record, filter));
                sort_records(&mut results, &[]);
                Ok(results)
            }
            Criteria::Query(query) => {
                let entities = &self.entities;
                execute_query(query, &mut |selector: &ModelSelector,
                                           conditions: &[Condition]| {
                    let selector = selector.resolve(models);
                    let mut results = Vec::new();
                    for (model, records) in entities {
                        if !selector.matches(model) {
                            continue;
                        }
                        results.extend(
                            records
                                .iter()
                                .filter(|r| conditions_match(r, conditions))
                                .cloned(),
                        );
                    }
                    Ok(results)
                })
            }
        }
    }

    fn apply_migrations(&mut self, directory: &Path) -> RepositoryResult<()> {
        self.ensure_open()?;
        debug!(directory = %directory.display(), "memory backend is schema-less, skipping migrations");
        Ok(())
    }

    fn empty(&mut self) -> RepositoryResult<()> {
        self.ensure_open()?;
        self.entities.clear();
        Ok(())
    }

    fn close(&mut self) -> RepositoryResult<()> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

fn conditions_match(record: &Record, conditions: &[Condition]) -> bool {
    conditions.iter().all(|condition| {
        match record.get(&condition.attribute) {
            Some(candidate) => condition.operator.evaluate(&candidate, &condition.value),
            None => false,
        }
    })
}

/// Conjunction of fuzzy per-attribute matches.
pub(crate) fn filter_matches(record: &Record, filter: &Filter) -> bool {
    filter.iter().all(|(attribute, expected)| {
        match record.get(attribute) {
            Some(candidate) => fuzzy_value_matches(&candidate, expected),
            None => false,
        }
    })
}

/// Fuzzy single-value match: strings are case-insensitive regular-expression
/// searches, lists match when any element does, everything else is exact.
pub(crate) fn fuzzy_value_matches(candidate: &AttributeValue, expected: &AttributeValue) -> bool {
    match (candidate, expected) {
        (AttributeValue::List(items), expected) if !matches!(expected, AttributeValue::List(_)) => {
            items.iter().any(|item| fuzzy_value_matches(item, expected))
        }
        (AttributeValue::Str(text), AttributeValue::Str(pattern)) => {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => regex.is_match(text),
                // Not a valid pattern: fall back to a plain substring match.
                Err(_) => text.to_lowercase().contains(&pattern.to_lowercase()),
            }
        }
        (candidate, expected) => candidate.compare(expected) == std::cmp::Ordering::Equal,
    }
}
