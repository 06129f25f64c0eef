//! The `File` record: entity metadata for a stored byte blob.
//!
//! File *content* moves through the much narrower [`FileStore`] contract
//! (load/save/delete); the metadata record itself is an ordinary entity and
//! can be persisted through the repository like any other model.
//!
//! [`FileStore`]: crate::files::FileStore

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::id::EntityId;
use crate::model::record::Model;
use crate::model::schema::{FieldKind, Schema};

/// Metadata of a stored file.
///
/// The byte content is deliberately not serialized with the entity; it lives
/// in the file store and is attached to this struct only after `load`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    /// Entity identity.
    pub id_: EntityId,
    /// Path of the file, relative to the file store's working directory
    /// unless absolute.
    pub path: String,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification timestamp.
    pub updated_at: Option<DateTime<Utc>>,
    /// Owning user.
    pub owner: Option<String>,
    /// Owning group.
    pub group: Option<String>,
    /// Permission string, e.g. `644`.
    pub permissions: Option<String>,
    /// Raw content, present only after the file store loaded it.
    #[serde(skip)]
    content: Option<Vec<u8>>,
}

impl File {
    /// Creates a file record for the given path with unassigned identity.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id_: EntityId::UNASSIGNED,
            path: path.into(),
            created_at: None,
            updated_at: None,
            owner: None,
            group: None,
            permissions: None,
            content: None,
        }
    }

    /// The loaded content, if any.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Attaches content to the record.
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = Some(content);
    }

    /// Returns true once content has been loaded or set.
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }
}

impl Model for File {
    const MODEL_NAME: &'static str = "file";

    fn schema() -> Schema {
        Schema::builder("file")
            .field("path", FieldKind::Str)
            .optional_field("created_at", FieldKind::DateTime)
            .optional_field("updated_at", FieldKind::DateTime)
            .optional_field("owner", FieldKind::Str)
            .optional_field("group", FieldKind::Str)
            .optional_field("permissions", FieldKind::Str)
            .build()
    }

    fn id(&self) -> EntityId {
        self.id_.clone()
    }

    fn set_id(&mut self, id: EntityId) {
        self.id_ = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::Record;

    #[test]
    fn test_content_is_not_an_entity_attribute() {
        let mut file = File::new("notes/today.md");
        file.set_content(b"hello".to_vec());

        let record = Record::from_model(&file).unwrap();
        assert!(record.get("content").is_none());
        assert_eq!(record.model_name(), "file");

        // Content does not survive the entity round trip; only metadata does.
        let back: File = record.into_model().unwrap();
        assert!(!back.has_content());
        assert_eq!(back.path, "notes/today.md");
    }
}
