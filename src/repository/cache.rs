//! Identity cache backing the skip-unchanged-adds optimization.

use std::collections::{BTreeMap, HashMap};

use crate::model::{AttributeValue, EntityId, Record};

/// Remembers the last attribute state seen per entity identity.
///
/// The repository consults it on every add: staging an entity whose
/// attributes match the cached state would be a no-op write, so the add is
/// skipped. Retrieval operations refresh the cache, deletes and `empty`
/// evict from it.
#[derive(Debug, Default)]
pub(crate) struct IdentityCache {
    entries: HashMap<(String, EntityId), BTreeMap<String, AttributeValue>>,
}

impl IdentityCache {
    /// Records the current state of an entity.
    pub(crate) fn insert(&mut self, record: &Record) {
        self.entries.insert(
            (record.model_name().to_string(), record.id().clone()),
            record.attributes().clone(),
        );
    }

    /// Returns true when the cached state equals the record's attributes.
    pub(crate) fn unchanged(&self, record: &Record) -> bool {
        self.entries
            .get(&(record.model_name().to_string(), record.id().clone()))
            .map(|attributes| attributes == record.attributes())
            .unwrap_or(false)
    }

    /// Forgets one entity.
    pub(crate) fn remove(&mut self, model: &str, id: &EntityId) {
        self.entries.remove(&(model.to_string(), id.clone()));
    }

    /// Forgets everything.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{FieldKind, Schema};

    fn record(name: &str) -> Record {
        let schema = Arc::new(Schema::builder("tag").field("name", FieldKind::Str).build());
        let mut attributes = BTreeMap::new();
        attributes.insert("name".to_string(), AttributeValue::Str(name.to_string()));
        Record::new(schema, EntityId::Int(1), attributes).unwrap()
    }

    #[test]
    fn test_unchanged_tracks_attribute_state() {
        let mut cache = IdentityCache::default();
        assert!(!cache.unchanged(&record("a")));

        cache.insert(&record("a"));
        assert!(cache.unchanged(&record("a")));
        // Same identity, different attributes: a real change.
        assert!(!cache.unchanged(&record("b")));

        cache.remove("tag", &EntityId::Int(1));
        assert!(!cache.unchanged(&record("a")));
    }
}
