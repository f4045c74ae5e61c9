//! Typed rows, create drafts and update patches for the four entity kinds.
//!
//! Drafts and patches validate caller input and produce the field maps sent to
//! the remote store. Validation failures surface as
//! [`DevhubError::Validation`] before any store mutation.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::entity::{Entity, EntityId, Fields};
use crate::error::{DevhubError, Result};
use crate::slots::{is_valid_slot, MAX_PROJECTS};
use crate::types::{EntityKind, FeatureStatus, ReleaseStatus};

pub const DEFAULT_PROJECT_NAME: &str = "Untitled Project";
pub const DEFAULT_NOTE_TITLE: &str = "Untitled Note";
pub const DEFAULT_CATEGORY: &str = "general";

const PROJECT_NAME_MAX: usize = 100;
const PROJECT_DESCRIPTION_MAX: usize = 500;
const FEATURE_TITLE_MAX: usize = 200;
const FEATURE_DESCRIPTION_MAX: usize = 1000;
const RELEASE_VERSION_MAX: usize = 50;
const NOTE_TITLE_MAX: usize = 200;

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub slot_number: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub status: FeatureStatus,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub project_id: String,
    pub version: String,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub status: ReleaseStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub content: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Empty rich-text document used when a note is created without content.
pub fn empty_document() -> Value {
    json!({ "type": "doc", "content": [] })
}

// ---------------------------------------------------------------------------
// Draft / Patch
// ---------------------------------------------------------------------------

/// Caller input for a create.
pub trait Draft {
    const KIND: EntityKind;

    /// Validate and normalize into the fields sent to the remote store.
    fn into_fields(self) -> Result<Fields>;
}

/// Caller input for an update. Only the fields that are set are sent.
pub trait Patch {
    const KIND: EntityKind;

    fn into_fields(self) -> Result<Fields>;
}

/// Local stand-in for a create: the validated fields plus provisional
/// timestamps, flagged as a placeholder.
pub fn placeholder_for(id: EntityId, fields: &Fields) -> Entity {
    let now = Value::String(now_rfc3339());
    let mut fields = fields.clone();
    fields.insert("created_at".to_string(), now.clone());
    fields.insert("updated_at".to_string(), now);
    Entity::placeholder(id, fields)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn object(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DevhubError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn max_chars(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(DevhubError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

fn or_default(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn date_value(date: Option<NaiveDate>) -> Value {
    date.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .unwrap_or(Value::Null)
}

fn released_at_for(status: ReleaseStatus) -> Value {
    match status {
        ReleaseStatus::Released => Value::String(now_rfc3339()),
        _ => Value::Null,
    }
}

/// Distinguishes an absent key (`None`) from an explicit `null`
/// (`Some(None)`) so patches can clear nullable columns.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn nothing_to_update(fields: Fields) -> Result<Fields> {
    if fields.is_empty() {
        return Err(DevhubError::validation("nothing to update"));
    }
    Ok(fields)
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDraft {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub slot_number: u8,
}

impl Draft for ProjectDraft {
    const KIND: EntityKind = EntityKind::Project;

    fn into_fields(self) -> Result<Fields> {
        let user_id = required("user_id", &self.user_id)?;
        if !is_valid_slot(self.slot_number) {
            return Err(DevhubError::validation(format!(
                "slot_number must be between 1 and {MAX_PROJECTS}"
            )));
        }
        let name = or_default(&self.name, DEFAULT_PROJECT_NAME);
        max_chars("name", &name, PROJECT_NAME_MAX)?;
        let description = self.description.trim().to_string();
        max_chars("description", &description, PROJECT_DESCRIPTION_MAX)?;

        Ok(object(json!({
            "user_id": user_id,
            "name": name,
            "description": description,
            "slot_number": self.slot_number,
        })))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Patch for ProjectPatch {
    const KIND: EntityKind = EntityKind::Project;

    fn into_fields(self) -> Result<Fields> {
        let mut fields = Fields::new();
        if let Some(name) = self.name {
            let name = or_default(&name, DEFAULT_PROJECT_NAME);
            max_chars("name", &name, PROJECT_NAME_MAX)?;
            fields.insert("name".into(), name.into());
        }
        if let Some(description) = self.description {
            let description = description.trim().to_string();
            max_chars("description", &description, PROJECT_DESCRIPTION_MAX)?;
            fields.insert("description".into(), description.into());
        }
        nothing_to_update(fields)
    }
}

// ---------------------------------------------------------------------------
// Feature
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureDraft {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: FeatureStatus,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Filled with the next free index when absent.
    #[serde(default)]
    pub order_index: Option<i64>,
}

impl Draft for FeatureDraft {
    const KIND: EntityKind = EntityKind::Feature;

    fn into_fields(self) -> Result<Fields> {
        let project_id = required("project_id", &self.project_id)?;
        let title = required("title", &self.title)?;
        max_chars("title", &title, FEATURE_TITLE_MAX)?;
        let description = self.description.trim().to_string();
        max_chars("description", &description, FEATURE_DESCRIPTION_MAX)?;
        let category = or_default(self.category.as_deref().unwrap_or(""), DEFAULT_CATEGORY);

        Ok(object(json!({
            "project_id": project_id,
            "title": title,
            "description": description,
            "category": category,
            "status": self.status,
            "order_index": self.order_index.unwrap_or(0),
            "due_date": date_value(self.due_date),
        })))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<FeatureStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub order_index: Option<i64>,
}

impl FeaturePatch {
    pub fn status(status: FeatureStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

impl Patch for FeaturePatch {
    const KIND: EntityKind = EntityKind::Feature;

    fn into_fields(self) -> Result<Fields> {
        let mut fields = Fields::new();
        if let Some(title) = self.title {
            let title = required("title", &title)?;
            max_chars("title", &title, FEATURE_TITLE_MAX)?;
            fields.insert("title".into(), title.into());
        }
        if let Some(description) = self.description {
            let description = description.trim().to_string();
            max_chars("description", &description, FEATURE_DESCRIPTION_MAX)?;
            fields.insert("description".into(), description.into());
        }
        if let Some(category) = self.category {
            fields.insert("category".into(), or_default(&category, DEFAULT_CATEGORY).into());
        }
        if let Some(status) = self.status {
            fields.insert("status".into(), status.as_str().into());
        }
        if let Some(due_date) = self.due_date {
            fields.insert("due_date".into(), date_value(due_date));
        }
        if let Some(order_index) = self.order_index {
            fields.insert("order_index".into(), order_index.into());
        }
        nothing_to_update(fields)
    }
}

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseDraft {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: ReleaseStatus,
    #[serde(default)]
    pub notes: String,
}

impl Draft for ReleaseDraft {
    const KIND: EntityKind = EntityKind::Release;

    fn into_fields(self) -> Result<Fields> {
        let project_id = required("project_id", &self.project_id)?;
        let version = required("version", &self.version)?;
        max_chars("version", &version, RELEASE_VERSION_MAX)?;
        let category = or_default(self.category.as_deref().unwrap_or(""), DEFAULT_CATEGORY);

        Ok(object(json!({
            "project_id": project_id,
            "version": version,
            "target_date": date_value(self.target_date),
            "category": category,
            "status": self.status,
            "notes": self.notes.trim(),
            "released_at": released_at_for(self.status),
        })))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleasePatch {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub target_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<ReleaseStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReleasePatch {
    pub fn status(status: ReleaseStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Fields for a release whose status is currently `current`.
    ///
    /// `released_at` is stamped when the status moves into `released` and
    /// cleared when it moves out. Re-sending the current status leaves it
    /// alone. An unknown current status counts as a transition.
    pub fn into_fields_from(self, current: Option<ReleaseStatus>) -> Result<Fields> {
        let next = self.status;
        let mut fields = self.into_fields()?;
        if let Some(next) = next {
            let was_released = current == Some(ReleaseStatus::Released);
            let is_released = next == ReleaseStatus::Released;
            if current.is_none() || was_released != is_released {
                fields.insert("released_at".into(), released_at_for(next));
            }
        }
        Ok(fields)
    }
}

impl Patch for ReleasePatch {
    const KIND: EntityKind = EntityKind::Release;

    fn into_fields(self) -> Result<Fields> {
        let mut fields = Fields::new();
        if let Some(version) = self.version {
            let version = required("version", &version)?;
            max_chars("version", &version, RELEASE_VERSION_MAX)?;
            fields.insert("version".into(), version.into());
        }
        if let Some(target_date) = self.target_date {
            fields.insert("target_date".into(), date_value(target_date));
        }
        if let Some(category) = self.category {
            fields.insert("category".into(), or_default(&category, DEFAULT_CATEGORY).into());
        }
        if let Some(status) = self.status {
            fields.insert("status".into(), status.as_str().into());
        }
        if let Some(notes) = self.notes {
            fields.insert("notes".into(), notes.trim().into());
        }
        nothing_to_update(fields)
    }
}

// ---------------------------------------------------------------------------
// Note
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteDraft {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
}

impl Draft for NoteDraft {
    const KIND: EntityKind = EntityKind::Note;

    fn into_fields(self) -> Result<Fields> {
        let project_id = required("project_id", &self.project_id)?;
        let user_id = required("user_id", &self.user_id)?;
        let title = or_default(&self.title, DEFAULT_NOTE_TITLE);
        max_chars("title", &title, NOTE_TITLE_MAX)?;
        let category = or_default(self.category.as_deref().unwrap_or(""), DEFAULT_CATEGORY);

        Ok(object(json!({
            "project_id": project_id,
            "user_id": user_id,
            "title": title,
            "category": category,
            "content": self.content.unwrap_or_else(empty_document),
        })))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
}

impl Patch for NotePatch {
    const KIND: EntityKind = EntityKind::Note;

    fn into_fields(self) -> Result<Fields> {
        let mut fields = Fields::new();
        if let Some(title) = self.title {
            let title = or_default(&title, DEFAULT_NOTE_TITLE);
            max_chars("title", &title, NOTE_TITLE_MAX)?;
            fields.insert("title".into(), title.into());
        }
        if let Some(category) = self.category {
            fields.insert("category".into(), or_default(&category, DEFAULT_CATEGORY).into());
        }
        if let Some(content) = self.content {
            fields.insert("content".into(), content);
        }
        nothing_to_update(fields)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn project_draft(name: &str, slot: u8) -> ProjectDraft {
        ProjectDraft {
            user_id: "u1".into(),
            name: name.into(),
            description: "  desc  ".into(),
            slot_number: slot,
        }
    }

    #[test]
    fn blank_project_name_becomes_untitled() {
        let fields = project_draft("   ", 1).into_fields().unwrap();
        assert_eq!(fields["name"], DEFAULT_PROJECT_NAME);
        assert_eq!(fields["description"], "desc");
        assert_eq!(fields["slot_number"], 1);
    }

    #[test]
    fn project_slot_and_length_limits() {
        assert!(matches!(
            project_draft("x", 0).into_fields(),
            Err(DevhubError::Validation(_))
        ));
        assert!(project_draft("x", 6).into_fields().is_err());
        assert!(project_draft(&"n".repeat(101), 1).into_fields().is_err());
        assert!(project_draft(&"n".repeat(100), 1).into_fields().is_ok());
    }

    #[test]
    fn feature_title_is_required() {
        let draft = FeatureDraft {
            project_id: "p".into(),
            title: "  ".into(),
            ..FeatureDraft::default()
        };
        let err = draft.into_fields().unwrap_err();
        assert!(err.to_string().contains("title is required"));
    }

    #[test]
    fn feature_defaults() {
        let fields = FeatureDraft {
            project_id: "p".into(),
            title: "Auth".into(),
            due_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            ..FeatureDraft::default()
        }
        .into_fields()
        .unwrap();
        assert_eq!(fields["status"], "planned");
        assert_eq!(fields["category"], DEFAULT_CATEGORY);
        assert_eq!(fields["order_index"], 0);
        assert_eq!(fields["due_date"], "2025-03-01");
    }

    #[test]
    fn released_status_stamps_released_at() {
        let fields = ReleaseDraft {
            project_id: "p".into(),
            version: "v1.0.0".into(),
            status: ReleaseStatus::Released,
            ..ReleaseDraft::default()
        }
        .into_fields()
        .unwrap();
        assert!(fields["released_at"].is_string());

        let patch = ReleasePatch::status(ReleaseStatus::Upcoming)
            .into_fields_from(Some(ReleaseStatus::Released))
            .unwrap();
        assert_eq!(patch["status"], "upcoming");
        assert!(patch["released_at"].is_null());
    }

    #[test]
    fn released_at_only_moves_on_transition() {
        let resend = ReleasePatch {
            status: Some(ReleaseStatus::Released),
            notes: Some("edit".into()),
            ..ReleasePatch::default()
        }
        .into_fields_from(Some(ReleaseStatus::Released))
        .unwrap();
        assert_eq!(resend["status"], "released");
        assert!(!resend.contains_key("released_at"));

        let sideways = ReleasePatch::status(ReleaseStatus::Upcoming)
            .into_fields_from(Some(ReleaseStatus::Planned))
            .unwrap();
        assert!(!sideways.contains_key("released_at"));

        let unknown = ReleasePatch::status(ReleaseStatus::Released)
            .into_fields_from(None)
            .unwrap();
        assert!(unknown["released_at"].is_string());
    }

    #[test]
    fn note_defaults_title_and_content() {
        let fields = NoteDraft {
            project_id: "p".into(),
            user_id: "u".into(),
            ..NoteDraft::default()
        }
        .into_fields()
        .unwrap();
        assert_eq!(fields["title"], DEFAULT_NOTE_TITLE);
        assert_eq!(fields["content"], empty_document());
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let clear: FeaturePatch = serde_json::from_str(r#"{"due_date": null}"#).unwrap();
        assert_eq!(clear.due_date, Some(None));
        let fields = clear.into_fields().unwrap();
        assert!(fields["due_date"].is_null());

        let absent: FeaturePatch = serde_json::from_str(r#"{"title": "New"}"#).unwrap();
        assert_eq!(absent.due_date, None);
        assert!(!absent.into_fields().unwrap().contains_key("due_date"));
    }

    #[test]
    fn empty_patch_is_rejected() {
        assert!(ProjectPatch::default().into_fields().is_err());
        assert!(NotePatch::default().into_fields().is_err());
    }

    #[test]
    fn placeholder_decodes_as_typed_row() {
        let fields = project_draft("Foo", 2).into_fields().unwrap();
        let entity = placeholder_for(EntityId::from("temp-1"), &fields);
        assert!(entity.is_placeholder);
        let project: Project = entity.decode().unwrap();
        assert_eq!(project.id, "temp-1");
        assert_eq!(project.name, "Foo");
        assert_eq!(project.slot_number, 2);
    }

    #[test]
    fn feature_row_decodes_wire_status() {
        let entity = Entity::new(
            "f1",
            object(json!({
                "project_id": "p",
                "title": "t",
                "status": "in-progress",
                "order_index": 3,
                "due_date": null,
                "created_at": "2025-01-01T00:00:00.000Z",
                "updated_at": "2025-01-01T00:00:00.000Z",
            })),
        );
        let feature: Feature = entity.decode().unwrap();
        assert_eq!(feature.status, FeatureStatus::InProgress);
        assert_eq!(feature.order_index, 3);
        assert_eq!(feature.category, DEFAULT_CATEGORY);
    }
}
