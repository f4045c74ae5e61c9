//! Features, releases and notes of one project, under
//! `/api/projects/{id}/{collection}`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use devhub_core::model::{FeatureDraft, FeaturePatch, NoteDraft, NotePatch, ReleaseDraft, ReleasePatch};
use devhub_core::types::EntityKind;
use devhub_core::{Entity, EntityId};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;
use crate::state::AppState;

fn child_kind(collection: &str) -> Result<EntityKind, AppError> {
    match collection.parse::<EntityKind>() {
        Ok(kind) if kind.is_project_child() => Ok(kind),
        _ => Err(AppError::not_found(format!("unknown collection '{collection}'"))),
    }
}

/// Decode a request body; shape errors are the caller's fault.
fn body<T: DeserializeOwned>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|e| AppError::bad_request(e.to_string()))
}

fn json(entity: Entity) -> Result<Json<Value>, AppError> {
    Ok(Json(serde_json::to_value(entity)?))
}

/// GET /api/projects/{id}/{collection}
pub async fn list_children(
    State(app): State<AppState>,
    Path((project_id, collection)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let ws = &app.workspace;
    let rows = match child_kind(&collection)? {
        EntityKind::Feature => ws.refresh_features(&project_id).await?,
        EntityKind::Release => ws.refresh_releases(&project_id).await?,
        _ => ws.refresh_notes(&project_id).await?,
    };
    Ok(Json(serde_json::to_value(rows)?))
}

/// POST /api/projects/{id}/{collection}
///
/// The path's project id wins over any `project_id` in the body.
pub async fn create_child(
    State(app): State<AppState>,
    Path((project_id, collection)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let ws = &app.workspace;
    let entity = match child_kind(&collection)? {
        EntityKind::Feature => {
            let mut draft: FeatureDraft = body(payload)?;
            draft.project_id = project_id;
            ws.create_feature(draft).await?
        }
        EntityKind::Release => {
            let mut draft: ReleaseDraft = body(payload)?;
            draft.project_id = project_id;
            ws.create_release(draft).await?
        }
        _ => {
            let mut draft: NoteDraft = body(payload)?;
            draft.project_id = project_id;
            ws.create_note(draft).await?
        }
    };
    Ok((StatusCode::CREATED, json(entity)?))
}

/// PATCH /api/projects/{id}/{collection}/{child_id}
pub async fn update_child(
    State(app): State<AppState>,
    Path((project_id, collection, child_id)): Path<(String, String, String)>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let ws = &app.workspace;
    let id = EntityId::from(child_id);
    let entity = match child_kind(&collection)? {
        EntityKind::Feature => {
            let patch: FeaturePatch = body(payload)?;
            ws.update_feature(&project_id, &id, patch).await?
        }
        EntityKind::Release => {
            let patch: ReleasePatch = body(payload)?;
            ws.update_release(&project_id, &id, patch).await?
        }
        _ => {
            let patch: NotePatch = body(payload)?;
            ws.update_note(&project_id, &id, patch).await?
        }
    };
    json(entity)
}

/// DELETE /api/projects/{id}/{collection}/{child_id}
pub async fn delete_child(
    State(app): State<AppState>,
    Path((project_id, collection, child_id)): Path<(String, String, String)>,
) -> Result<Json<Value>, AppError> {
    let kind = child_kind(&collection)?;
    app.workspace
        .delete_child(kind, &project_id, &EntityId::from(child_id.as_str()))
        .await?;
    Ok(Json(serde_json::json!({ "deleted": child_id })))
}
