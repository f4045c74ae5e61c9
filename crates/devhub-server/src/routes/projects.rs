use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use devhub_core::model::{ProjectDraft, ProjectPatch};
use devhub_core::EntityId;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectBody {
    #[serde(flatten)]
    pub draft: ProjectDraft,
    #[serde(default)]
    pub template: Option<String>,
}

/// GET /api/projects: refresh from the remote store, return the store list.
pub async fn list_projects(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let projects = app.workspace.refresh_projects().await?;
    Ok(Json(serde_json::to_value(projects)?))
}

/// POST /api/projects
pub async fn create_project(
    State(app): State<AppState>,
    Json(body): Json<CreateProjectBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let entity = match body.template.as_deref().filter(|t| !t.is_empty()) {
        Some(template) => {
            app.workspace
                .create_project_from_template(body.draft, template)
                .await?
        }
        None => app.workspace.create_project(body.draft).await?,
    };
    Ok((StatusCode::CREATED, Json(serde_json::to_value(entity)?)))
}

/// PATCH /api/projects/{id}
pub async fn update_project(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ProjectPatch>,
) -> Result<Json<serde_json::Value>, AppError> {
    let entity = app
        .workspace
        .update_project(&EntityId::from(id), patch)
        .await?;
    Ok(Json(serde_json::to_value(entity)?))
}

/// DELETE /api/projects/{id}
pub async fn delete_project(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    app.workspace.delete_project(&EntityId::from(id.as_str())).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// GET /api/slots
pub async fn list_slots(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "available": app.workspace.available_slots() }))
}
