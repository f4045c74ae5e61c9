//! Contract for the remote persistence API.
//!
//! The hosted backend (its query layer and row-level security) is consumed
//! here, not designed. Adapters: [`InMemoryGateway`](crate::memory::InMemoryGateway)
//! and the HTTP driver in `devhub-remote`.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::entity::{Entity, EntityId, Fields};
use crate::types::EntityKind;

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayErrorKind {
    NotFound,
    PermissionDenied,
    Conflict,
    Timeout,
    Unknown,
}

impl GatewayErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GatewayErrorKind::NotFound => "not-found",
            GatewayErrorKind::PermissionDenied => "permission-denied",
            GatewayErrorKind::Conflict => "conflict",
            GatewayErrorKind::Timeout => "timeout",
            GatewayErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the remote store: a machine-readable kind plus a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::PermissionDenied, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Conflict, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Unknown, message)
    }
}

// ---------------------------------------------------------------------------
// ListFilter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Equality predicates, optional ordering and limit for `list`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub eq: Vec<(String, Value)>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.eq.iter().all(|(column, expected)| {
            if column == "id" {
                expected.as_str() == Some(entity.id.as_str())
            } else {
                entity.get(column) == Some(expected)
            }
        })
    }

    /// Apply predicates, ordering and limit to an in-memory row set.
    pub fn apply(&self, rows: impl IntoIterator<Item = Entity>) -> Vec<Entity> {
        let mut out: Vec<Entity> = rows.into_iter().filter(|e| self.matches(e)).collect();
        if let Some(order) = &self.order {
            out.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

/// Total order over the JSON values used as sort keys. Missing and null
/// values sort last in ascending order.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

// ---------------------------------------------------------------------------
// RemoteGateway
// ---------------------------------------------------------------------------

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
pub type GatewayFuture<'a, T> = BoxFuture<'a, GatewayResult<T>>;

/// The persistence API of the hosted backend.
///
/// Object-safe so callers can hold an `Arc<dyn RemoteGateway>`.
pub trait RemoteGateway: Send + Sync {
    /// Insert a row and return it as stored (server-issued id, timestamps).
    fn create(&self, kind: EntityKind, fields: Fields) -> GatewayFuture<'_, Entity>;

    fn update<'a>(
        &'a self,
        kind: EntityKind,
        id: &'a EntityId,
        patch: Fields,
    ) -> GatewayFuture<'a, Entity>;

    fn delete<'a>(&'a self, kind: EntityKind, id: &'a EntityId) -> GatewayFuture<'a, ()>;

    fn list<'a>(&'a self, kind: EntityKind, filter: &'a ListFilter)
        -> GatewayFuture<'a, Vec<Entity>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, value: Value) -> Entity {
        Entity::new(id, value.as_object().cloned().unwrap())
    }

    #[test]
    fn filter_eq_order_and_limit() {
        let rows = vec![
            row("a", json!({"user_id": "u1", "slot_number": 3})),
            row("b", json!({"user_id": "u2", "slot_number": 1})),
            row("c", json!({"user_id": "u1", "slot_number": 1})),
            row("d", json!({"user_id": "u1", "slot_number": 2})),
        ];
        let filter = ListFilter::new()
            .eq("user_id", "u1")
            .order_by("slot_number", true)
            .limit(2);
        let out: Vec<_> = filter.apply(rows).into_iter().map(|e| e.id.to_string()).collect();
        assert_eq!(out, vec!["c", "d"]);
    }

    #[test]
    fn descending_order_puts_nulls_first() {
        let rows = vec![
            row("a", json!({"order_index": 1})),
            row("b", json!({"order_index": null})),
            row("c", json!({"order_index": 4})),
        ];
        let out: Vec<_> = ListFilter::new()
            .order_by("order_index", false)
            .apply(rows)
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(out, vec!["b", "c", "a"]);
    }

    #[test]
    fn filter_on_id_column() {
        let filter = ListFilter::new().eq("id", "b");
        assert!(filter.matches(&row("b", json!({}))));
        assert!(!filter.matches(&row("a", json!({}))));
    }

    #[test]
    fn error_display_includes_kind() {
        let err = GatewayError::conflict("slot 2 taken");
        assert_eq!(err.to_string(), "conflict: slot 2 taken");
    }
}
