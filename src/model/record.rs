//! The `Model` trait and the dynamic `Record` representation.
//!
//! Typed entities implement [`Model`]; the repository and the backends move
//! them around as [`Record`]s, a validated `(model, id, attributes)` triple.
//! Conversion in either direction goes through the model schema, so invalid
//! attribute values are rejected before they ever reach storage.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{BackendError, MergeError, RepositoryResult};
use crate::model::id::EntityId;
use crate::model::schema::Schema;
use crate::model::value::AttributeValue;

/// Attribute name under which the identity travels in serialized form.
pub const ID_ATTRIBUTE: &str = "id_";

/// A typed, identity-bearing domain record.
///
/// Implementors are plain `serde` structs with an `id_: EntityId` field and a
/// declared [`Schema`]. The schema is the single source of truth for the
/// attribute names and kinds every backend sees.
pub trait Model: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// The discriminator identifying this model across backends.
    ///
    /// By convention the lowercase type name; it names the relational table
    /// and the document discriminator value.
    const MODEL_NAME: &'static str;

    /// Builds the schema descriptor for this model.
    fn schema() -> Schema;

    /// The entity's identity.
    fn id(&self) -> EntityId;

    /// Replaces the entity's identity (used by auto-increment assignment).
    fn set_id(&mut self, id: EntityId);

    /// Identity equality: same model, same id.
    ///
    /// Fails closed across models by construction, since both sides share
    /// this type.
    fn same_entity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// Merges `source` into `self`, returning the merged entity.
    ///
    /// Attributes listed in the schema's merge-skip set keep their value from
    /// `self`; everything else is overwritten by `source`. Fails with
    /// [`MergeError`] when the identities (or the designated merge key)
    /// differ.
    fn merge(&self, source: &Self) -> RepositoryResult<Self> {
        let target = Record::from_model(self)?;
        let source = Record::from_model(source)?;
        target.merge(&source)?.into_model()
    }
}

/// The dynamic form of an entity: what backends store and filter.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    id: EntityId,
    attributes: BTreeMap<String, AttributeValue>,
}

impl Record {
    /// Builds a record from raw parts, validating against the schema.
    pub fn new(
        schema: Arc<Schema>,
        id: EntityId,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> RepositoryResult<Self> {
        schema.validate(&attributes)?;
        Ok(Self {
            schema,
            id,
            attributes,
        })
    }

    /// Converts a typed entity into a record.
    pub fn from_model<M: Model>(entity: &M) -> RepositoryResult<Self> {
        let value = serde_json::to_value(entity).map_err(|e| BackendError::Serialization {
            backend: "model",
            message: e.to_string(),
        })?;
        let Some(mut object) = value.as_object().cloned() else {
            return Err(BackendError::Serialization {
                backend: "model",
                message: format!("model {} did not serialize to an object", M::MODEL_NAME),
            }
            .into());
        };
        object.remove(ID_ATTRIBUTE);
        Self::from_json(Arc::new(M::schema()), entity.id(), &object)
    }

    /// Builds a record from a stored JSON object (without the id attribute).
    pub fn from_json(
        schema: Arc<Schema>,
        id: EntityId,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> RepositoryResult<Self> {
        let attributes = schema.decode_attributes(object)?;
        Ok(Self {
            schema,
            id,
            attributes,
        })
    }

    /// Materializes the record into a typed entity.
    pub fn into_model<M: Model>(&self) -> RepositoryResult<M> {
        let mut object = self.to_json_object();
        let id = serde_json::to_value(&self.id).map_err(|e| BackendError::Serialization {
            backend: "model",
            message: e.to_string(),
        })?;
        object.insert(ID_ATTRIBUTE.to_string(), id);
        serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
            BackendError::Serialization {
                backend: "model",
                message: format!("cannot materialize {}: {}", self.model_name(), e),
            }
            .into()
        })
    }

    /// The record's attributes as a JSON object, without the id.
    pub fn to_json_object(&self) -> serde_json::Map<String, serde_json::Value> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }

    /// The discriminator of this record's model.
    pub fn model_name(&self) -> &str {
        self.schema.model_name()
    }

    /// The record's schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The record's identity.
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Replaces the record's identity.
    pub fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    /// All attributes in name order.
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    /// Looks up a single attribute value; the id is addressable as `id_`.
    pub fn get(&self, attribute: &str) -> Option<AttributeValue> {
        if attribute == ID_ATTRIBUTE {
            return Some(match &self.id {
                EntityId::Int(n) => AttributeValue::Int(*n),
                EntityId::Str(s) => AttributeValue::Str(s.clone()),
            });
        }
        self.attributes.get(attribute).cloned()
    }

    /// Merges `source` into this record.
    ///
    /// Both records must share the model and the identity; when the schema
    /// designates a merge key, the key values must match instead of the ids.
    /// Merge-skip attributes keep their target value, all others are taken
    /// from `source`.
    pub fn merge(&self, source: &Record) -> Result<Record, MergeError> {
        if self.model_name() != source.model_name() {
            return Err(MergeError::ModelMismatch {
                target: self.model_name().to_string(),
                incoming: source.model_name().to_string(),
            });
        }

        match self.schema.merge_key() {
            Some(key) => {
                let target_key = self.get(key).unwrap_or(AttributeValue::Null);
                let source_key = source.get(key).unwrap_or(AttributeValue::Null);
                if target_key != source_key {
                    return Err(MergeError::IdentityMismatch {
                        model: self.model_name().to_string(),
                        attribute: key.to_string(),
                        target: target_key.to_string(),
                        incoming: source_key.to_string(),
                    });
                }
            }
            None => {
                if self.id != source.id {
                    return Err(MergeError::IdentityMismatch {
                        model: self.model_name().to_string(),
                        attribute: ID_ATTRIBUTE.to_string(),
                        target: self.id.to_string(),
                        incoming: source.id.to_string(),
                    });
                }
            }
        }

        let mut merged = self.clone();
        for (name, value) in &source.attributes {
            if !self.schema.skips_on_merge(name) {
                merged.attributes.insert(name.clone(), value.clone());
            }
        }
        Ok(merged)
    }
}

/// Identity equality: same model name and same id.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.model_name() == other.model_name() && self.id == other.id
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.model_name().hash(state);
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::error::RepositoryError;
    use crate::model::schema::FieldKind;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Author {
        id_: EntityId,
        name: String,
        country: Option<String>,
        rating: i64,
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

    fn jane() -> Author {
        Author {
            id_: EntityId::Int(1),
            name: "Jane".to_string(),
            country: Some("UK".to_string()),
            rating: 5,
        }
    }

    #[test]
    fn test_round_trip_through_record() {
        let author = jane();
        let record = Record::from_model(&author).unwrap();
        assert_eq!(record.model_name(), "author");
        assert_eq!(record.id(), &EntityId::Int(1));
        assert_eq!(record.get("name"), Some(AttributeValue::Str("Jane".into())));

        let back: Author = record.into_model().unwrap();
        assert_eq!(back, author);
    }

    #[test]
    fn test_identity_equality_ignores_attributes() {
        let a = Record::from_model(&jane()).unwrap();
        let mut other = jane();
        other.name = "Janet".to_string();
        let b = Record::from_model(&other).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_merge_overwrites_all_but_skipped_attributes() {
        let stored = jane();
        let update = Author {
            id_: EntityId::Int(1),
            name: "Jane Doe".to_string(),
            country: None,
            rating: 1,
        };

        let merged = stored.merge(&update).unwrap();
        assert_eq!(merged.name, "Jane Doe");
        assert_eq!(merged.country, None);
        // rating is in the merge-skip set, the stored value wins.
        assert_eq!(merged.rating, 5);
    }

    #[test]
    fn test_merge_rejects_different_identities() {
        let mut other = jane();
        other.id_ = EntityId::Int(2);

        let error = jane().merge(&other).unwrap_err();
        assert!(matches!(
            error,
            RepositoryError::Merge(MergeError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn test_merge_by_designated_key() {
        let schema = Arc::new(
            Schema::builder("account")
                .field("email", FieldKind::Str)
                .field("plan", FieldKind::Str)
                .merge_key("email")
                .build(),
        );
        let mut target_attributes = BTreeMap::new();
        target_attributes.insert("email".to_string(), AttributeValue::Str("a@b.c".into()));
        target_attributes.insert("plan".to_string(), AttributeValue::Str("free".into()));
        let target =
            Record::new(schema.clone(), EntityId::Int(1), target_attributes).unwrap();

        let mut source_attributes = BTreeMap::new();
        source_attributes.insert("email".to_string(), AttributeValue::Str("a@b.c".into()));
        source_attributes.insert("plan".to_string(), AttributeValue::Str("pro".into()));
        // Different ids: the merge key decides, not the id.
        let source = Record::new(schema, EntityId::Int(9), source_attributes).unwrap();

        let merged = target.merge(&source).unwrap();
        assert_eq!(merged.get("plan"), Some(AttributeValue::Str("pro".into())));
    }

    #[test]
    fn test_record_validates_on_construction() {
        let schema = Arc::new(Schema::builder("author").field("name", FieldKind::Str).build());
        let error = Record::new(schema, EntityId::Int(1), BTreeMap::new()).unwrap_err();
        assert!(matches!(error, RepositoryError::Validation(_)));
    }
}
