//! In-process stand-in for the hosted backend.
//!
//! Issues UUID ids and timestamps the way the real database does, enforces
//! the per-user project slots, cascades project deletes, and lets tests inject
//! latency, failures, and calls that never resolve.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use crate::entity::{Entity, EntityId, Fields};
use crate::gateway::{
    GatewayError, GatewayFuture, GatewayResult, ListFilter, RemoteGateway,
};
use crate::slots::MAX_PROJECTS;
use crate::types::EntityKind;

#[derive(Debug, Clone)]
enum Injection {
    Fail(GatewayError),
    Hang,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<EntityKind, Vec<Entity>>,
    latency: Duration,
    injections: VecDeque<Injection>,
    calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Delay applied to every subsequent call.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Make the next call fail with `err`. Queued injections apply in order.
    pub fn fail_next(&self, err: GatewayError) {
        self.lock().injections.push_back(Injection::Fail(err));
    }

    /// Make the next call never resolve.
    pub fn hang_next(&self) {
        self.lock().injections.push_back(Injection::Hang);
    }

    /// Number of gateway calls served so far.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    /// Current rows of a table, in insertion order.
    pub fn rows(&self, kind: EntityKind) -> Vec<Entity> {
        self.lock().tables.get(&kind).cloned().unwrap_or_default()
    }

    /// Insert a row directly, bypassing latency, injections and constraints.
    pub fn seed(&self, kind: EntityKind, fields: Fields) -> Entity {
        let entity = Entity::new(Uuid::new_v4().to_string(), stamp_new(fields));
        self.lock().tables.entry(kind).or_default().push(entity.clone());
        entity
    }

    async fn enter(&self) -> GatewayResult<()> {
        let (latency, injection) = {
            let mut state = self.lock();
            state.calls += 1;
            (state.latency, state.injections.pop_front())
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match injection {
            Some(Injection::Fail(err)) => Err(err),
            Some(Injection::Hang) => {
                futures::future::pending::<()>().await;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn insert_row(&self, kind: EntityKind, mut fields: Fields) -> GatewayResult<Entity> {
        fields.remove("id");
        let mut state = self.lock();
        match kind {
            EntityKind::Project => check_project_slot(&state, &fields)?,
            _ => check_parent_project(&state, &fields)?,
        }
        let entity = Entity::new(Uuid::new_v4().to_string(), stamp_new(fields));
        state.tables.entry(kind).or_default().push(entity.clone());
        Ok(entity)
    }

    fn update_row(&self, kind: EntityKind, id: &EntityId, mut patch: Fields) -> GatewayResult<Entity> {
        patch.insert("updated_at".to_string(), Value::String(timestamp()));
        let mut state = self.lock();
        let row = state
            .tables
            .get_mut(&kind)
            .and_then(|rows| rows.iter_mut().find(|e| &e.id == id))
            .ok_or_else(|| GatewayError::not_found(format!("{} {id} not found", kind.as_str())))?;
        row.merge(&patch);
        Ok(row.clone())
    }

    fn delete_row(&self, kind: EntityKind, id: &EntityId) -> GatewayResult<()> {
        let mut state = self.lock();
        let rows = state.tables.entry(kind).or_default();
        let before = rows.len();
        rows.retain(|e| &e.id != id);
        if rows.len() == before {
            return Err(GatewayError::not_found(format!("{} {id} not found", kind.as_str())));
        }
        if kind == EntityKind::Project {
            let parent = Value::String(id.to_string());
            for child in EntityKind::all().iter().filter(|k| k.is_project_child()) {
                if let Some(rows) = state.tables.get_mut(child) {
                    rows.retain(|e| e.get("project_id") != Some(&parent));
                }
            }
        }
        Ok(())
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn stamp_new(mut fields: Fields) -> Fields {
    let now = Value::String(timestamp());
    fields.insert("created_at".to_string(), now.clone());
    fields.insert("updated_at".to_string(), now);
    fields
}

fn check_project_slot(state: &MemoryState, fields: &Fields) -> GatewayResult<()> {
    let user = fields.get("user_id");
    let owned: Vec<&Entity> = state
        .tables
        .get(&EntityKind::Project)
        .map(|rows| rows.iter().filter(|e| e.get("user_id") == user).collect())
        .unwrap_or_default();
    if owned.len() >= MAX_PROJECTS {
        return Err(GatewayError::conflict(format!(
            "user already owns {MAX_PROJECTS} projects"
        )));
    }
    let slot = fields.get("slot_number");
    if owned.iter().any(|e| e.get("slot_number") == slot) {
        return Err(GatewayError::conflict(format!(
            "slot {} already in use",
            slot.map(Value::to_string).unwrap_or_default()
        )));
    }
    Ok(())
}

fn check_parent_project(state: &MemoryState, fields: &Fields) -> GatewayResult<()> {
    let Some(Value::String(project_id)) = fields.get("project_id") else {
        return Err(GatewayError::conflict("project_id is required"));
    };
    let exists = state
        .tables
        .get(&EntityKind::Project)
        .is_some_and(|rows| rows.iter().any(|e| e.id.as_str() == project_id));
    if !exists {
        return Err(GatewayError::conflict(format!(
            "project {project_id} does not exist"
        )));
    }
    Ok(())
}

impl RemoteGateway for InMemoryGateway {
    fn create(&self, kind: EntityKind, fields: Fields) -> GatewayFuture<'_, Entity> {
        Box::pin(async move {
            self.enter().await?;
            self.insert_row(kind, fields)
        })
    }

    fn update<'a>(
        &'a self,
        kind: EntityKind,
        id: &'a EntityId,
        patch: Fields,
    ) -> GatewayFuture<'a, Entity> {
        Box::pin(async move {
            self.enter().await?;
            self.update_row(kind, id, patch)
        })
    }

    fn delete<'a>(&'a self, kind: EntityKind, id: &'a EntityId) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            self.enter().await?;
            self.delete_row(kind, id)
        })
    }

    fn list<'a>(
        &'a self,
        kind: EntityKind,
        filter: &'a ListFilter,
    ) -> GatewayFuture<'a, Vec<Entity>> {
        Box::pin(async move {
            self.enter().await?;
            Ok(filter.apply(self.rows(kind)))
        })
    }
}
