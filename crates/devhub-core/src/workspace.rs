//! One signed-in user's view of their projects.
//!
//! Creates go through the [`Reconciler`] (placeholder first, then commit or
//! roll back). Updates and deletes go straight to the gateway and apply the
//! authoritative result to the store once it returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::entity::{Entity, EntityId, Fields};
use crate::error::{DevhubError, Result};
use crate::gateway::{ListFilter, RemoteGateway};
use crate::model::{
    placeholder_for, Draft, FeatureDraft, FeaturePatch, NoteDraft, NotePatch, Patch, ProjectDraft,
    ProjectPatch, ReleaseDraft, ReleasePatch,
};
use crate::reconciler::{Reconciler, ReconcilerOptions};
use crate::slots::{self, MAX_PROJECTS};
use crate::store::{change_bus, ChangeBus, EntityStore, StoreChange};
use crate::templates;
use crate::types::{EntityKind, FeatureStatus, ReleaseStatus};

type ChildKey = (EntityKind, String);

pub struct Workspace {
    user_id: String,
    gateway: Arc<dyn RemoteGateway>,
    reconciler: Reconciler,
    bus: ChangeBus,
    projects: EntityStore,
    children: Mutex<HashMap<ChildKey, EntityStore>>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("user_id", &self.user_id)
            .field("reconciler", &self.reconciler)
            .field("projects", &self.projects.len())
            .finish_non_exhaustive()
    }
}

impl Workspace {
    pub fn new(
        user_id: impl Into<String>,
        gateway: Arc<dyn RemoteGateway>,
        opts: ReconcilerOptions,
    ) -> Self {
        let bus = change_bus();
        Self {
            user_id: user_id.into(),
            gateway,
            reconciler: Reconciler::new(opts),
            projects: EntityStore::with_bus(EntityKind::Project.table(), bus.clone()),
            bus,
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn projects(&self) -> &EntityStore {
        &self.projects
    }

    /// Changes from every store this workspace owns.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.bus.subscribe()
    }

    /// The store holding `kind` rows of one project, created on first use.
    pub fn store(&self, kind: EntityKind, project_id: &str) -> Result<EntityStore> {
        if !kind.is_project_child() {
            return Err(DevhubError::validation(format!(
                "{kind} is not stored per project"
            )));
        }
        let mut children = self.lock_children();
        let store = children
            .entry((kind, project_id.to_string()))
            .or_insert_with(|| {
                EntityStore::with_bus(format!("{}:{project_id}", kind.table()), self.bus.clone())
            });
        Ok(store.clone())
    }

    fn lock_children(&self) -> MutexGuard<'_, HashMap<ChildKey, EntityStore>> {
        self.children.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reject_placeholder(&self, id: &EntityId) -> Result<()> {
        if id.is_placeholder_tag(self.reconciler.placeholder_prefix()) {
            return Err(DevhubError::validation(format!(
                "{id} is still being created"
            )));
        }
        Ok(())
    }

    async fn create_optimistic(
        &self,
        store: &EntityStore,
        kind: EntityKind,
        fields: Fields,
    ) -> Result<Entity> {
        let gateway = Arc::clone(&self.gateway);
        let remote_fields = fields.clone();
        self.reconciler
            .create(
                store,
                |id| Ok(placeholder_for(id, &fields)),
                move || async move { gateway.create(kind, remote_fields).await },
            )
            .await
    }

    async fn update_in<P: Patch>(&self, store: &EntityStore, id: &EntityId, patch: P) -> Result<Entity> {
        self.reject_placeholder(id)?;
        let fields = patch.into_fields()?;
        self.apply_update(store, P::KIND, id, fields).await
    }

    async fn apply_update(
        &self,
        store: &EntityStore,
        kind: EntityKind,
        id: &EntityId,
        fields: Fields,
    ) -> Result<Entity> {
        let entity = self.gateway.update(kind, id, fields).await?;
        store.update(id, &entity.fields);
        tracing::debug!(collection = store.collection(), id = %id, "entity updated");
        Ok(entity)
    }

    async fn delete_in(&self, store: &EntityStore, kind: EntityKind, id: &EntityId) -> Result<()> {
        self.reject_placeholder(id)?;
        self.gateway.delete(kind, id).await?;
        store.remove(id);
        tracing::debug!(collection = store.collection(), id = %id, "entity deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub async fn refresh_projects(&self) -> Result<Vec<Entity>> {
        let filter = ListFilter::new()
            .eq("user_id", self.user_id.as_str())
            .order_by("slot_number", true);
        let rows = self.gateway.list(EntityKind::Project, &filter).await?;
        self.projects.set_all(rows);
        Ok(self.projects.list())
    }

    /// Slots not held by any project in the store, placeholders included.
    pub fn available_slots(&self) -> Vec<u8> {
        slots::available_slots(&self.projects.list())
    }

    pub fn select_project(&self, id: &EntityId) -> bool {
        self.projects.select(id)
    }

    /// The project is always owned by this workspace's user, whatever the
    /// draft carries.
    pub async fn create_project(&self, mut draft: ProjectDraft) -> Result<Entity> {
        draft.user_id = self.user_id.clone();
        let slot = draft.slot_number;
        let fields = draft.into_fields()?;

        let existing = self.projects.list();
        if existing.len() >= MAX_PROJECTS {
            return Err(DevhubError::ProjectLimitReached(MAX_PROJECTS));
        }
        if existing.iter().any(|p| slots::slot_of(p) == Some(slot)) {
            return Err(DevhubError::SlotUnavailable(slot));
        }

        self.create_optimistic(&self.projects, EntityKind::Project, fields)
            .await
    }

    /// Create a project, then seed it with the template's features, releases
    /// and notes. Seeding failures surface after the project is committed.
    pub async fn create_project_from_template(
        &self,
        draft: ProjectDraft,
        template_id: &str,
    ) -> Result<Entity> {
        let template = templates::find(template_id)?;
        let project = self.create_project(draft).await?;
        let project_id = project.id.to_string();

        let features = self.store(EntityKind::Feature, &project_id)?;
        for draft in template.feature_drafts(&project_id) {
            self.seed(&features, draft).await?;
        }
        let releases = self.store(EntityKind::Release, &project_id)?;
        for draft in template.release_drafts(&project_id) {
            self.seed(&releases, draft).await?;
        }
        let notes = self.store(EntityKind::Note, &project_id)?;
        for draft in template.note_drafts(&project_id, &self.user_id) {
            self.seed(&notes, draft).await?;
        }

        tracing::info!(
            project = %project.id,
            template = template.id,
            features = template.features.len(),
            releases = template.releases.len(),
            notes = template.notes.len(),
            "project seeded from template"
        );
        Ok(project)
    }

    async fn seed<D: Draft>(&self, store: &EntityStore, draft: D) -> Result<()> {
        let entity = self.gateway.create(D::KIND, draft.into_fields()?).await?;
        store.insert(entity)
    }

    pub async fn update_project(&self, id: &EntityId, patch: ProjectPatch) -> Result<Entity> {
        self.update_in(&self.projects, id, patch).await
    }

    /// Delete a project. Its feature, release and note stores go with it.
    pub async fn delete_project(&self, id: &EntityId) -> Result<()> {
        self.delete_in(&self.projects, EntityKind::Project, id).await?;
        self.lock_children()
            .retain(|(_, project_id), _| project_id != id.as_str());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Project children
    // -----------------------------------------------------------------------

    async fn refresh_children(&self, kind: EntityKind, project_id: &str) -> Result<Vec<Entity>> {
        let store = self.store(kind, project_id)?;
        let filter = ListFilter::new().eq("project_id", project_id);
        let filter = match kind {
            EntityKind::Feature => filter.order_by("order_index", true),
            EntityKind::Release => filter.order_by("created_at", false),
            _ => filter.order_by("updated_at", false),
        };
        let rows = self.gateway.list(kind, &filter).await?;
        store.set_all(rows);
        Ok(store.list())
    }

    async fn create_child(&self, kind: EntityKind, project_id: &str, fields: Fields) -> Result<Entity> {
        self.reject_placeholder(&EntityId::from(project_id))?;
        let store = self.store(kind, project_id)?;
        self.create_optimistic(&store, kind, fields).await
    }

    pub async fn refresh_features(&self, project_id: &str) -> Result<Vec<Entity>> {
        self.refresh_children(EntityKind::Feature, project_id).await
    }

    pub async fn refresh_releases(&self, project_id: &str) -> Result<Vec<Entity>> {
        self.refresh_children(EntityKind::Release, project_id).await
    }

    pub async fn refresh_notes(&self, project_id: &str) -> Result<Vec<Entity>> {
        self.refresh_children(EntityKind::Note, project_id).await
    }

    /// New features go to the end: one past the highest `order_index` held
    /// locally, pending placeholders included.
    pub async fn create_feature(&self, mut draft: FeatureDraft) -> Result<Entity> {
        let project_id = draft.project_id.clone();
        if draft.order_index.is_none() {
            let store = self.store(EntityKind::Feature, &project_id)?;
            let next = store
                .list()
                .iter()
                .filter_map(|f| f.get_i64("order_index"))
                .max()
                .map_or(0, |max| max + 1);
            draft.order_index = Some(next);
        }
        let fields = draft.into_fields()?;
        self.create_child(EntityKind::Feature, &project_id, fields).await
    }

    pub async fn create_release(&self, draft: ReleaseDraft) -> Result<Entity> {
        let project_id = draft.project_id.clone();
        let fields = draft.into_fields()?;
        self.create_child(EntityKind::Release, &project_id, fields).await
    }

    pub async fn create_note(&self, mut draft: NoteDraft) -> Result<Entity> {
        draft.user_id = self.user_id.clone();
        let project_id = draft.project_id.clone();
        let fields = draft.into_fields()?;
        self.create_child(EntityKind::Note, &project_id, fields).await
    }

    pub async fn update_feature(
        &self,
        project_id: &str,
        id: &EntityId,
        patch: FeaturePatch,
    ) -> Result<Entity> {
        let store = self.store(EntityKind::Feature, project_id)?;
        self.update_in(&store, id, patch).await
    }

    pub async fn update_release(
        &self,
        project_id: &str,
        id: &EntityId,
        patch: ReleasePatch,
    ) -> Result<Entity> {
        self.reject_placeholder(id)?;
        let store = self.store(EntityKind::Release, project_id)?;
        let current = match patch.status {
            Some(_) => self.release_status(&store, id).await?,
            None => None,
        };
        let fields = patch.into_fields_from(current)?;
        self.apply_update(&store, EntityKind::Release, id, fields).await
    }

    /// Current status of a release, from the store or else the remote row.
    async fn release_status(&self, store: &EntityStore, id: &EntityId) -> Result<Option<ReleaseStatus>> {
        let row = match store.get(id) {
            Some(row) => Some(row),
            None => {
                let filter = ListFilter::new().eq("id", id.as_str()).limit(1);
                self.gateway
                    .list(EntityKind::Release, &filter)
                    .await?
                    .into_iter()
                    .next()
            }
        };
        Ok(row.and_then(|r| r.get_str("status").and_then(|s| s.parse().ok())))
    }

    pub async fn update_note(&self, project_id: &str, id: &EntityId, patch: NotePatch) -> Result<Entity> {
        let store = self.store(EntityKind::Note, project_id)?;
        self.update_in(&store, id, patch).await
    }

    pub async fn set_feature_status(
        &self,
        project_id: &str,
        id: &EntityId,
        status: FeatureStatus,
    ) -> Result<Entity> {
        self.update_feature(project_id, id, FeaturePatch::status(status))
            .await
    }

    /// Moving into `released` stamps `released_at`; moving out clears it.
    pub async fn set_release_status(
        &self,
        project_id: &str,
        id: &EntityId,
        status: ReleaseStatus,
    ) -> Result<Entity> {
        self.update_release(project_id, id, ReleasePatch::status(status))
            .await
    }

    pub async fn delete_child(&self, kind: EntityKind, project_id: &str, id: &EntityId) -> Result<()> {
        let store = self.store(kind, project_id)?;
        self.delete_in(&store, kind, id).await
    }

    pub async fn delete_feature(&self, project_id: &str, id: &EntityId) -> Result<()> {
        self.delete_child(EntityKind::Feature, project_id, id).await
    }

    pub async fn delete_release(&self, project_id: &str, id: &EntityId) -> Result<()> {
        self.delete_child(EntityKind::Release, project_id, id).await
    }

    pub async fn delete_note(&self, project_id: &str, id: &EntityId) -> Result<()> {
        self.delete_child(EntityKind::Note, project_id, id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, GatewayErrorKind};
    use crate::memory::InMemoryGateway;
    use crate::model::{Feature, Project, Release};
    use serde_json::json;
    use std::time::Duration;

    fn workspace() -> (Workspace, InMemoryGateway) {
        let gw = InMemoryGateway::new();
        let ws = Workspace::new("u1", Arc::new(gw.clone()), ReconcilerOptions::default());
        (ws, gw)
    }

    fn project(name: &str, slot: u8) -> ProjectDraft {
        ProjectDraft {
            name: name.into(),
            slot_number: slot,
            ..ProjectDraft::default()
        }
    }

    #[tokio::test]
    async fn create_project_commits_authoritative_entity() {
        let (ws, gw) = workspace();
        let created = ws.create_project(project("Foo", 1)).await.unwrap();
        assert!(!created.is_placeholder);

        let list = ws.projects().list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, created.id);
        let row: Project = list[0].decode().unwrap();
        assert_eq!(row.user_id, "u1");
        assert_eq!(row.name, "Foo");
        assert_eq!(gw.rows(EntityKind::Project).len(), 1);
        assert_eq!(ws.available_slots(), vec![2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn drafts_cannot_claim_another_owner() {
        let (ws, gw) = workspace();
        let created = ws
            .create_project(ProjectDraft {
                user_id: "u2".into(),
                ..project("Foo", 1)
            })
            .await
            .unwrap();
        assert_eq!(created.get_str("user_id"), Some("u1"));

        let note = ws
            .create_note(NoteDraft {
                project_id: created.id.to_string(),
                user_id: "u2".into(),
                ..NoteDraft::default()
            })
            .await
            .unwrap();
        assert_eq!(note.get_str("user_id"), Some("u1"));

        let list = ws.refresh_projects().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(gw.rows(EntityKind::Project).len(), 1);
    }

    #[tokio::test]
    async fn taken_slot_is_rejected_locally() {
        let (ws, gw) = workspace();
        ws.create_project(project("A", 3)).await.unwrap();
        let err = ws.create_project(project("B", 3)).await.unwrap_err();
        assert!(matches!(err, DevhubError::SlotUnavailable(3)));
        assert_eq!(gw.calls(), 1);
    }

    #[tokio::test]
    async fn sixth_project_hits_the_limit() {
        let (ws, _gw) = workspace();
        for slot in 1..=5 {
            ws.create_project(project("P", slot)).await.unwrap();
        }
        let err = ws.create_project(project("P", 1)).await.unwrap_err();
        assert!(matches!(err, DevhubError::ProjectLimitReached(5)));
        assert!(ws.available_slots().is_empty());
    }

    #[tokio::test]
    async fn remote_rejection_rolls_back() {
        let (ws, gw) = workspace();
        gw.fail_next(GatewayError::permission_denied("row-level security"));
        let err = ws.create_project(project("A", 1)).await.unwrap_err();
        match err {
            DevhubError::RemoteRejected(e) => assert_eq!(e.kind, GatewayErrorKind::PermissionDenied),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(ws.projects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_times_out() {
        let gw = InMemoryGateway::new();
        let ws = Workspace::new(
            "u1",
            Arc::new(gw.clone()),
            ReconcilerOptions {
                deadline: Duration::from_millis(200),
                ..ReconcilerOptions::default()
            },
        );
        gw.hang_next();
        let err = ws.create_project(project("A", 1)).await.unwrap_err();
        assert!(matches!(err, DevhubError::TimeoutExceeded { deadline_ms: 200 }));
        assert!(ws.projects().is_empty());
        assert!(ws.reconciler().pending().is_empty());
    }

    #[tokio::test]
    async fn refresh_lists_only_own_projects_by_slot() {
        let (ws, gw) = workspace();
        let fields = |user: &str, slot: u8| {
            json!({"user_id": user, "name": "P", "slot_number": slot})
                .as_object()
                .cloned()
                .unwrap()
        };
        gw.seed(EntityKind::Project, fields("u1", 4));
        gw.seed(EntityKind::Project, fields("u2", 1));
        gw.seed(EntityKind::Project, fields("u1", 2));

        let list = ws.refresh_projects().await.unwrap();
        let slots: Vec<_> = list.iter().filter_map(slots::slot_of).collect();
        assert_eq!(slots, vec![2, 4]);
    }

    #[tokio::test]
    async fn template_seeds_child_stores() {
        let (ws, gw) = workspace();
        let project = ws
            .create_project_from_template(project("Shop", 1), "web-app")
            .await
            .unwrap();
        let pid = project.id.to_string();
        let template = templates::find("web-app").unwrap();

        assert_eq!(ws.store(EntityKind::Feature, &pid).unwrap().len(), template.features.len());
        assert_eq!(ws.store(EntityKind::Release, &pid).unwrap().len(), template.releases.len());
        assert_eq!(ws.store(EntityKind::Note, &pid).unwrap().len(), template.notes.len());
        assert_eq!(gw.rows(EntityKind::Feature).len(), template.features.len());
    }

    #[tokio::test]
    async fn unknown_template_creates_nothing() {
        let (ws, gw) = workspace();
        let err = ws
            .create_project_from_template(project("X", 1), "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, DevhubError::Validation(_)));
        assert!(ws.projects().is_empty());
        assert_eq!(gw.calls(), 0);
    }

    #[tokio::test]
    async fn features_append_in_order() {
        let (ws, _gw) = workspace();
        let pid = ws.create_project(project("P", 1)).await.unwrap().id.to_string();
        for title in ["one", "two", "three"] {
            ws.create_feature(FeatureDraft {
                project_id: pid.clone(),
                title: title.into(),
                ..FeatureDraft::default()
            })
            .await
            .unwrap();
        }
        let order: Vec<_> = ws
            .store(EntityKind::Feature, &pid)
            .unwrap()
            .list()
            .iter()
            .filter_map(|f| f.get_i64("order_index"))
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn status_changes_apply_to_store() {
        let (ws, _gw) = workspace();
        let pid = ws.create_project(project("P", 1)).await.unwrap().id.to_string();
        let feature = ws
            .create_feature(FeatureDraft {
                project_id: pid.clone(),
                title: "Login".into(),
                ..FeatureDraft::default()
            })
            .await
            .unwrap();
        ws.set_feature_status(&pid, &feature.id, FeatureStatus::Done)
            .await
            .unwrap();
        let stored: Feature = ws
            .store(EntityKind::Feature, &pid)
            .unwrap()
            .get(&feature.id)
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(stored.status, FeatureStatus::Done);

        let release = ws
            .create_release(ReleaseDraft {
                project_id: pid.clone(),
                version: "1.0.0".into(),
                ..ReleaseDraft::default()
            })
            .await
            .unwrap();
        let updated: Release = ws
            .set_release_status(&pid, &release.id, ReleaseStatus::Released)
            .await
            .unwrap()
            .decode()
            .unwrap();
        assert!(updated.released_at.is_some());
    }

    #[tokio::test]
    async fn editing_a_released_release_keeps_its_date() {
        let (ws, _gw) = workspace();
        let pid = ws.create_project(project("P", 1)).await.unwrap().id.to_string();
        let release = ws
            .create_release(ReleaseDraft {
                project_id: pid.clone(),
                version: "1.0.0".into(),
                ..ReleaseDraft::default()
            })
            .await
            .unwrap();
        let first: Release = ws
            .set_release_status(&pid, &release.id, ReleaseStatus::Released)
            .await
            .unwrap()
            .decode()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let edit = ReleasePatch {
            status: Some(ReleaseStatus::Released),
            notes: Some("edit".into()),
            ..ReleasePatch::default()
        };
        let edited: Release = ws
            .update_release(&pid, &release.id, edit)
            .await
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(edited.notes, "edit");
        assert_eq!(edited.released_at, first.released_at);

        // Not in the local store: the current status comes from the remote row.
        ws.store(EntityKind::Release, &pid).unwrap().remove(&release.id);
        let again: Release = ws
            .set_release_status(&pid, &release.id, ReleaseStatus::Released)
            .await
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(again.released_at, first.released_at);

        let reopened: Release = ws
            .set_release_status(&pid, &release.id, ReleaseStatus::Upcoming)
            .await
            .unwrap()
            .decode()
            .unwrap();
        assert!(reopened.released_at.is_none());
    }

    #[tokio::test]
    async fn children_of_unknown_project_are_rejected_remotely() {
        let (ws, _gw) = workspace();
        let err = ws
            .create_note(NoteDraft {
                project_id: "missing".into(),
                ..NoteDraft::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DevhubError::RemoteRejected(_)));
        assert!(ws.store(EntityKind::Note, "missing").unwrap().is_empty());
    }

    #[tokio::test]
    async fn placeholders_cannot_be_updated_or_deleted() {
        let (ws, gw) = workspace();
        let id = EntityId::from("temp-9");
        let err = ws
            .update_project(&id, ProjectPatch { name: Some("x".into()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DevhubError::Validation(_)));
        assert!(ws.delete_project(&id).await.is_err());
        assert_eq!(gw.calls(), 0);
    }

    #[tokio::test]
    async fn deleting_a_project_drops_child_stores() {
        let (ws, _gw) = workspace();
        let project = ws
            .create_project_from_template(project("P", 2), "api-service")
            .await
            .unwrap();
        let pid = project.id.to_string();
        let old = ws.store(EntityKind::Feature, &pid).unwrap();
        assert!(!old.is_empty());

        ws.delete_project(&project.id).await.unwrap();
        assert!(ws.projects().is_empty());
        assert!(ws.store(EntityKind::Feature, &pid).unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_bus_carries_all_collections() {
        let (ws, _gw) = workspace();
        let mut rx = ws.subscribe();
        let pid = ws.create_project(project("P", 1)).await.unwrap().id.to_string();
        ws.create_note(NoteDraft {
            project_id: pid.clone(),
            ..NoteDraft::default()
        })
        .await
        .unwrap();

        let mut collections = Vec::new();
        while let Ok(change) = rx.try_recv() {
            collections.push(change.collection);
        }
        assert!(collections.contains(&"projects".to_string()));
        assert!(collections.contains(&format!("notes:{pid}")));
    }

    #[test]
    fn projects_are_not_a_child_kind() {
        let (ws, _gw) = workspace();
        assert!(ws.store(EntityKind::Project, "p").is_err());
    }
}
