//! Entity identity values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The identity of an entity within its model.
///
/// Ids are either integers or strings (URL identities are strings). Integer
/// ids below zero are the "not yet assigned" sentinel: the repository replaces
/// them with `max(existing ids) + 1` when the entity is added.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Integer identity, eligible for auto-increment.
    Int(i64),
    /// String identity (including URL-shaped ids).
    Str(String),
}

impl EntityId {
    /// The sentinel marking an id that the repository must assign.
    pub const UNASSIGNED: EntityId = EntityId::Int(-1);

    /// Returns true when the repository still has to assign this id.
    pub fn is_unassigned(&self) -> bool {
        matches!(self, EntityId::Int(n) if *n < 0)
    }

    /// Returns the integer value, if this is an integer id.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            EntityId::Int(n) => Some(*n),
            EntityId::Str(_) => None,
        }
    }

    /// Returns the string value, if this is a string id.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EntityId::Int(_) => None,
            EntityId::Str(s) => Some(s),
        }
    }
}

impl Default for EntityId {
    fn default() -> Self {
        EntityId::UNASSIGNED
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(n) => write!(f, "{}", n),
            EntityId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Int(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Str(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_sentinel() {
        assert!(EntityId::UNASSIGNED.is_unassigned());
        assert!(EntityId::Int(-5).is_unassigned());
        assert!(!EntityId::Int(0).is_unassigned());
        assert!(!EntityId::Str("x".into()).is_unassigned());
        assert_eq!(EntityId::default(), EntityId::UNASSIGNED);
    }

    #[test]
    fn test_ordering() {
        assert!(EntityId::Int(1) < EntityId::Int(2));
        // Integer ids sort before string ids in mixed-model listings.
        assert!(EntityId::Int(100) < EntityId::Str("a".into()));
        assert!(EntityId::Str("a".into()) < EntityId::Str("b".into()));
    }

    #[test]
    fn test_serde_untagged_round_trip() {
        let int: EntityId = serde_json::from_str("3").unwrap();
        assert_eq!(int, EntityId::Int(3));

        let string: EntityId = serde_json::from_str("\"https://example.org/1\"").unwrap();
        assert_eq!(string, EntityId::Str("https://example.org/1".into()));

        assert_eq!(serde_json::to_string(&EntityId::Int(3)).unwrap(), "3");
    }
}
