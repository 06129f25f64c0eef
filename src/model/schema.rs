//! Schema descriptors for entity models.
//!
//! Every entity type declares a static schema: the attribute names, their
//! kinds, the attributes excluded from merges, and an optional alternative
//! merge key. Backends consult the schema to validate values, to map rows to
//! columns, and to materialize stored rows back into typed entities.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{FieldError, ValidationError};
use crate::model::value::AttributeValue;

/// The declared kind of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Boolean attribute.
    Bool,
    /// Integer attribute.
    Int,
    /// Floating point attribute.
    Float,
    /// String attribute.
    Str,
    /// UTC timestamp attribute.
    DateTime,
    /// Homogeneous list attribute.
    List(Box<FieldKind>),
}

impl FieldKind {
    /// Human-readable name used in validation messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Bool => "boolean",
            FieldKind::Int => "integer",
            FieldKind::Float => "float",
            FieldKind::Str => "string",
            FieldKind::DateTime => "datetime",
            FieldKind::List(_) => "list",
        }
    }

    /// Decodes a JSON value into an [`AttributeValue`] of this kind.
    pub fn decode(&self, value: &serde_json::Value) -> Result<AttributeValue, String> {
        match (self, value) {
            (_, serde_json::Value::Null) => Ok(AttributeValue::Null),
            (FieldKind::Bool, serde_json::Value::Bool(b)) => Ok(AttributeValue::Bool(*b)),
            (FieldKind::Int, serde_json::Value::Number(n)) => n
                .as_i64()
                .map(AttributeValue::Int)
                .ok_or_else(|| format!("expected an integer, got {}", n)),
            (FieldKind::Float, serde_json::Value::Number(n)) => n
                .as_f64()
                .map(AttributeValue::Float)
                .ok_or_else(|| format!("expected a number, got {}", n)),
            (FieldKind::Str, serde_json::Value::String(s)) => Ok(AttributeValue::Str(s.clone())),
            (FieldKind::DateTime, serde_json::Value::String(s)) => s
                .parse::<DateTime<Utc>>()
                .map(AttributeValue::DateTime)
                .map_err(|e| format!("expected an RFC 3339 datetime: {}", e)),
            (FieldKind::List(element), serde_json::Value::Array(items)) => {
                let mut decoded = Vec::with_capacity(items.len());
                for item in items {
                    decoded.push(element.decode(item)?);
                }
                Ok(AttributeValue::List(decoded))
            }
            (kind, other) => Err(format!("expected a {}, got {}", kind.name(), other)),
        }
    }
}

/// The declaration of a single attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Attribute name.
    pub name: String,
    /// Declared kind.
    pub kind: FieldKind,
    /// Whether the attribute must be present and non-null.
    pub required: bool,
}

/// The kind of id a model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// Integer ids, eligible for auto-increment.
    Int,
    /// String ids (including URL ids); never auto-incremented.
    Str,
}

impl IdKind {
    /// Human-readable name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            IdKind::Int => "integers",
            IdKind::Str => "strings",
        }
    }
}

/// Static description of an entity model.
///
/// Built once per type through [`Schema::builder`] and shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    model_name: String,
    id_kind: IdKind,
    fields: Vec<FieldDescriptor>,
    merge_skip: Vec<String>,
    merge_key: Option<String>,
}

impl Schema {
    /// Starts building a schema for the given model name.
    ///
    /// The model name is the discriminator used as table or collection
    /// partition across every backend; by convention it is the lowercase
    /// type name.
    pub fn builder(model_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            schema: Schema {
                model_name: model_name.into(),
                id_kind: IdKind::Int,
                fields: Vec::new(),
                merge_skip: Vec::new(),
                merge_key: None,
            },
        }
    }

    /// The discriminator string identifying this model across backends.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// The kind of id this model uses.
    pub fn id_kind(&self) -> IdKind {
        self.id_kind
    }

    /// The declared attributes, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field declaration by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Attributes excluded from merge propagation.
    pub fn merge_skip(&self) -> &[String] {
        &self.merge_skip
    }

    /// Returns true if the attribute must keep its target value on merge.
    pub fn skips_on_merge(&self, attribute: &str) -> bool {
        self.merge_skip.iter().any(|name| name == attribute)
    }

    /// The designated unique attribute used instead of the id when merging,
    /// if the model declares one.
    pub fn merge_key(&self) -> Option<&str> {
        self.merge_key.as_deref()
    }

    /// Validates a full attribute map against the declared fields.
    ///
    /// Checks every field and reports all offending ones at once. Unknown
    /// attributes and missing required attributes are both violations.
    pub fn validate(
        &self,
        attributes: &BTreeMap<String, AttributeValue>,
    ) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        for field in &self.fields {
            match attributes.get(&field.name) {
                None | Some(AttributeValue::Null) if field.required => {
                    errors.push(FieldError::new(&field.name, "required attribute is missing"));
                }
                _ => {}
            }
        }
        for name in attributes.keys() {
            if self.field(name).is_none() {
                errors.push(FieldError::new(name, "attribute is not declared in the schema"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                model: self.model_name.clone(),
                fields: errors,
            })
        }
    }

    /// Decodes a JSON object into a validated attribute map.
    ///
    /// Used by backends when materializing stored rows. Type mismatches and
    /// missing required attributes are collected into a single
    /// [`ValidationError`]; stored keys the schema no longer declares are
    /// ignored, so reads stay tolerant of stale rows.
    pub fn decode_attributes(
        &self,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<BTreeMap<String, AttributeValue>, ValidationError> {
        let mut attributes = BTreeMap::new();
        let mut errors = Vec::new();

        for field in &self.fields {
            match object.get(&field.name) {
                Some(value) => match field.kind.decode(value) {
                    Ok(AttributeValue::Null) if field.required => {
                        errors.push(FieldError::new(&field.name, "required attribute is missing"));
                    }
                    Ok(decoded) => {
                        attributes.insert(field.name.clone(), decoded);
                    }
                    Err(message) => errors.push(FieldError::new(&field.name, message)),
                },
                None if field.required => {
                    errors.push(FieldError::new(&field.name, "required attribute is missing"));
                }
                None => {
                    attributes.insert(field.name.clone(), AttributeValue::Null);
                }
            }
        }

        if errors.is_empty() {
            Ok(attributes)
        } else {
            Err(ValidationError {
                model: self.model_name.clone(),
                fields: errors,
            })
        }
    }
}

/// Builder for [`Schema`].
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Declares the id kind. Defaults to [`IdKind::Int`].
    pub fn id_kind(mut self, kind: IdKind) -> Self {
        self.schema.id_kind = kind;
        self
    }

    /// Declares a required attribute.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.schema.fields.push(FieldDescriptor {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Declares an optional attribute.
    pub fn optional_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.schema.fields.push(FieldDescriptor {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// Excludes an attribute from merge propagation.
    pub fn skip_on_merge(mut self, name: impl Into<String>) -> Self {
        self.schema.merge_skip.push(name.into());
        self
    }

    /// Designates a unique attribute used instead of the id when merging.
    pub fn merge_key(mut self, name: impl Into<String>) -> Self {
        self.schema.merge_key = Some(name.into());
        self
    }

    /// Finishes the schema.
    pub fn build(self) -> Schema {
        self.schema
    }
}

/// Registry mapping model names to their schemas.
///
/// Built once at startup and shared with the backends that need to
/// materialize rows (document and relational stores).
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed model.
    pub fn register<M: crate::model::Model>(mut self) -> Self {
        let schema = Arc::new(M::schema());
        self.schemas.insert(schema.model_name().to_string(), schema);
        self
    }

    /// Registers a schema directly.
    pub fn register_schema(mut self, schema: Schema) -> Self {
        self.schemas
            .insert(schema.model_name().to_string(), Arc::new(schema));
        self
    }

    /// Looks up the schema for a model name.
    pub fn get(&self, model_name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(model_name).cloned()
    }

    /// All registered model names, sorted.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered schemas.
    pub fn schemas(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values()
    }
}
