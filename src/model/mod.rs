//! Entity model: identities, attribute values, schemas, and records.
//!
//! The typed surface is the [`Model`] trait; the dynamic surface every
//! backend operates on is the [`Record`]. A [`Schema`] per model bridges the
//! two and carries the validation and merge rules.

mod file;
mod id;
mod record;
mod schema;
mod value;

pub use file::File;
pub use id::EntityId;
pub use record::{Model, Record, ID_ATTRIBUTE};
pub use schema::{FieldDescriptor, FieldKind, IdKind, Schema, SchemaBuilder, SchemaRegistry};
pub use value::AttributeValue;
