use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{DevhubError, Result};

/// Attribute map of an entity. Opaque to the store and the reconciler.
pub type Fields = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id carries the reserved placeholder prefix.
    pub fn is_placeholder_tag(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(prefix)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A domain record as held by an [`EntityStore`](crate::store::EntityStore).
///
/// Serializes flat: `{"id": "...", "is_placeholder": false, "name": "..."}`.
/// Rows coming back from the remote store omit `is_placeholder` and decode
/// as authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    #[serde(default)]
    pub is_placeholder: bool,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Entity {
    /// An authoritative entity, as issued by the remote store.
    pub fn new(id: impl Into<EntityId>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            is_placeholder: false,
            fields,
        }
    }

    /// A locally synthesized entity standing in for a pending create.
    pub fn placeholder(id: impl Into<EntityId>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            is_placeholder: true,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }

    /// Shallow-merge `patch` into this entity's fields. An `id` key in the
    /// patch is ignored; identity never changes through a merge.
    pub fn merge(&mut self, patch: &Fields) {
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Decode into a typed row (e.g. [`Project`](crate::model::Project)).
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut map = self.fields.clone();
        map.insert("id".to_string(), Value::String(self.id.0.clone()));
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Build an authoritative entity from a serializable row that has an
    /// `id` field.
    pub fn from_record<T: Serialize>(record: &T) -> Result<Self> {
        let Value::Object(mut map) = serde_json::to_value(record)? else {
            return Err(DevhubError::validation("record must serialize to an object"));
        };
        let id = match map.remove("id") {
            Some(Value::String(id)) => id,
            _ => return Err(DevhubError::validation("record has no string id")),
        };
        Ok(Self::new(id, map))
    }
}
