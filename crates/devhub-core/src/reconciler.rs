//! Optimistic create with commit / rollback reconciliation.
//!
//! ```text
//! perform_optimistic_create
//!     │  build placeholder (validation errors raised here, store untouched)
//!     ▼
//! store.insert(placeholder)            ── pending
//!     │
//!     ├── remote_call() ───────┐
//!     │                        │  select!, remote polled first
//!     └── sleep(deadline) ─────┘
//!     ▼
//! Ok(entity)  → store.replace(placeholder, entity)   ── committed
//! Err(e)      → store.remove(placeholder)            ── rolled back (RemoteRejected)
//! deadline    → store.remove(placeholder)            ── rolled back (TimeoutExceeded)
//! ```
//!
//! Exactly one terminal store mutation happens per invocation. Dropping the
//! returned future before it settles also rolls the placeholder back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::entity::{Entity, EntityId};
use crate::error::{DevhubError, Result};
use crate::gateway::GatewayError;
use crate::placeholder::{PlaceholderIds, DEFAULT_PLACEHOLDER_PREFIX};
use crate::store::EntityStore;

pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(10_000);

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What happens to a remote create that succeeds after its deadline fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateArrival {
    /// Drop the remote future at the deadline; a late write stays invisible
    /// until the next refresh.
    #[default]
    Discard,
    /// Keep the remote future running; insert the entity if it later succeeds.
    Adopt,
}

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    pub deadline: Duration,
    pub placeholder_prefix: String,
    pub late_arrival: LateArrival,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            placeholder_prefix: DEFAULT_PLACEHOLDER_PREFIX.to_string(),
            late_arrival: LateArrival::Discard,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Coordinates optimistic creates against any number of stores.
///
/// Cloning shares the placeholder id generator and the pending set, so ids
/// are unique across every store the clones touch.
#[derive(Debug, Clone)]
pub struct Reconciler {
    ids: Arc<PlaceholderIds>,
    pending: Arc<Mutex<BTreeSet<EntityId>>>,
    deadline: Duration,
    late_arrival: LateArrival,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcilerOptions::default())
    }
}

impl Reconciler {
    pub fn new(opts: ReconcilerOptions) -> Self {
        Self {
            ids: Arc::new(PlaceholderIds::new(opts.placeholder_prefix)),
            pending: Arc::new(Mutex::new(BTreeSet::new())),
            deadline: opts.deadline,
            late_arrival: opts.late_arrival,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn placeholder_prefix(&self) -> &str {
        self.ids.prefix()
    }

    /// Placeholder ids of creates still awaiting the remote store.
    pub fn pending(&self) -> Vec<EntityId> {
        lock(&self.pending).iter().cloned().collect()
    }

    /// [`perform_optimistic_create`](Self::perform_optimistic_create) with
    /// the configured deadline.
    pub async fn create<B, F, Fut>(
        &self,
        store: &EntityStore,
        build_placeholder: B,
        remote_call: F,
    ) -> Result<Entity>
    where
        B: FnOnce(EntityId) -> Result<Entity>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Entity, GatewayError>> + Send + 'static,
    {
        self.perform_optimistic_create(store, build_placeholder, remote_call, self.deadline)
            .await
    }

    /// Insert a placeholder, race `remote_call` against `deadline`, then
    /// commit or roll back.
    ///
    /// `build_placeholder` receives a fresh placeholder id. Returning an error
    /// from it aborts before the store is touched. The built entity is always
    /// flagged as a placeholder, whatever the builder set.
    pub async fn perform_optimistic_create<B, F, Fut>(
        &self,
        store: &EntityStore,
        build_placeholder: B,
        remote_call: F,
        deadline: Duration,
    ) -> Result<Entity>
    where
        B: FnOnce(EntityId) -> Result<Entity>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Entity, GatewayError>> + Send + 'static,
    {
        let mut placeholder = build_placeholder(self.ids.next_id())?;
        placeholder.is_placeholder = true;
        let placeholder_id = placeholder.id.clone();

        store.insert(placeholder)?;
        let mut guard = PendingGuard::new(store, &self.pending, placeholder_id.clone());
        tracing::debug!(
            collection = store.collection(),
            placeholder = %placeholder_id,
            "optimistic create pending"
        );

        let started = Instant::now();
        let mut call = Box::pin(remote_call());
        let settled = tokio::select! {
            biased;
            res = &mut call => Some(res),
            _ = tokio::time::sleep(deadline) => None,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match settled {
            Some(Ok(mut entity)) => {
                guard.settle();
                entity.is_placeholder = false;
                match store.replace(&placeholder_id, entity.clone()) {
                    Ok(()) => tracing::info!(
                        collection = store.collection(),
                        placeholder = %placeholder_id,
                        id = %entity.id,
                        elapsed_ms,
                        "optimistic create committed"
                    ),
                    Err(e) => tracing::error!(
                        collection = store.collection(),
                        placeholder = %placeholder_id,
                        id = %entity.id,
                        error = %e,
                        "commit found no placeholder to replace"
                    ),
                }
                Ok(entity)
            }
            Some(Err(err)) => {
                guard.settle();
                store.remove(&placeholder_id);
                tracing::warn!(
                    collection = store.collection(),
                    placeholder = %placeholder_id,
                    error = %err,
                    elapsed_ms,
                    "optimistic create rolled back: remote rejected"
                );
                Err(DevhubError::RemoteRejected(err))
            }
            None => {
                guard.settle();
                store.remove(&placeholder_id);
                let deadline_ms = deadline.as_millis() as u64;
                tracing::warn!(
                    collection = store.collection(),
                    placeholder = %placeholder_id,
                    deadline_ms,
                    "optimistic create rolled back: deadline exceeded"
                );
                if self.late_arrival == LateArrival::Adopt {
                    adopt_late_arrival(store.clone(), placeholder_id, call);
                }
                Err(DevhubError::TimeoutExceeded { deadline_ms })
            }
        }
    }
}

/// Keep awaiting a timed-out remote call; insert its result if it succeeds.
fn adopt_late_arrival<Fut>(
    store: EntityStore,
    placeholder_id: EntityId,
    call: std::pin::Pin<Box<Fut>>,
) where
    Fut: Future<Output = std::result::Result<Entity, GatewayError>> + Send + 'static,
{
    tokio::spawn(async move {
        match call.await {
            Ok(mut entity) => {
                entity.is_placeholder = false;
                let id = entity.id.clone();
                match store.insert(entity) {
                    Ok(()) => tracing::info!(
                        collection = store.collection(),
                        placeholder = %placeholder_id,
                        id = %id,
                        "adopted late remote create"
                    ),
                    Err(e) => tracing::debug!(
                        collection = store.collection(),
                        id = %id,
                        error = %e,
                        "late remote create already present"
                    ),
                }
            }
            Err(err) => tracing::debug!(
                collection = store.collection(),
                placeholder = %placeholder_id,
                error = %err,
                "late remote create failed"
            ),
        }
    });
}

fn lock(pending: &Mutex<BTreeSet<EntityId>>) -> MutexGuard<'_, BTreeSet<EntityId>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// PendingGuard
// ---------------------------------------------------------------------------

/// Tracks one in-flight create. If dropped unsettled (the caller's future was
/// cancelled), the placeholder is removed so it cannot linger.
struct PendingGuard<'a> {
    store: &'a EntityStore,
    pending: &'a Mutex<BTreeSet<EntityId>>,
    id: EntityId,
    settled: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(store: &'a EntityStore, pending: &'a Mutex<BTreeSet<EntityId>>, id: EntityId) -> Self {
        lock(pending).insert(id.clone());
        Self {
            store,
            pending,
            id,
            settled: false,
        }
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
        if !self.settled && self.store.remove(&self.id).is_some() {
            tracing::warn!(
                collection = self.store.collection(),
                placeholder = %self.id,
                "optimistic create cancelled; placeholder removed"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Fields;
    use crate::gateway::GatewayErrorKind;
    use crate::store::StoreEvent;
    use serde_json::json;

    fn named(name: &str) -> Fields {
        json!({ "name": name }).as_object().cloned().unwrap()
    }

    fn build(name: &'static str) -> impl FnOnce(EntityId) -> Result<Entity> {
        move |id| Ok(Entity::placeholder(id, named(name)))
    }

    fn ids(store: &EntityStore) -> Vec<String> {
        store.list().iter().map(|e| e.id.to_string()).collect()
    }

    fn resolves_after(
        ms: u64,
        id: &'static str,
        name: &'static str,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, std::result::Result<Entity, GatewayError>>
    {
        move || {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Entity::new(id, named(name)))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn commit_replaces_placeholder() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();

        let out = reconciler
            .perform_optimistic_create(
                &store,
                build("Foo"),
                resolves_after(50, "srv-9", "Foo"),
                Duration::from_millis(10_000),
            )
            .await
            .unwrap();

        assert_eq!(out.id.as_str(), "srv-9");
        assert!(!out.is_placeholder);
        assert_eq!(store.list(), vec![Entity::new("srv-9", named("Foo"))]);
        assert!(reconciler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_is_visible_while_pending() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();
        let mut rx = store.subscribe();

        let task = {
            let store = store.clone();
            let reconciler = reconciler.clone();
            tokio::spawn(async move {
                reconciler
                    .create(&store, build("Foo"), resolves_after(50, "srv-9", "Foo"))
                    .await
            })
        };

        let inserted = rx.recv().await.unwrap();
        assert_eq!(inserted.event, StoreEvent::Inserted { id: "temp-1".into() });
        assert!(store.get(&"temp-1".into()).unwrap().is_placeholder);
        assert_eq!(reconciler.pending(), vec![EntityId::from("temp-1")]);

        task.await.unwrap().unwrap();
        let replaced = rx.recv().await.unwrap();
        assert_eq!(
            replaced.event,
            StoreEvent::Replaced {
                old_id: "temp-1".into(),
                new_id: "srv-9".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_rolls_back() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();

        let err = reconciler
            .create(&store, build("Foo"), || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<Entity, _>(GatewayError::permission_denied("row-level security"))
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DevhubError::RemoteRejected(GatewayError { kind: GatewayErrorKind::PermissionDenied, .. })
        ));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_rolls_back() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();
        let started = tokio::time::Instant::now();

        let err = reconciler
            .perform_optimistic_create(
                &store,
                build("Foo"),
                || futures::future::pending::<std::result::Result<Entity, GatewayError>>(),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DevhubError::TimeoutExceeded { deadline_ms: 100 }));
        assert!(store.is_empty());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_settling_at_the_deadline_still_commits() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();

        let out = reconciler
            .perform_optimistic_create(
                &store,
                build("Foo"),
                resolves_after(100, "srv-1", "Foo"),
                Duration::from_millis(100),
            )
            .await
            .unwrap();

        assert_eq!(out.id.as_str(), "srv-1");
        assert_eq!(ids(&store), vec!["srv-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_just_before_deadline_commits() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();

        reconciler
            .perform_optimistic_create(
                &store,
                build("Foo"),
                resolves_after(99, "srv-1", "Foo"),
                Duration::from_millis(100),
            )
            .await
            .unwrap();
        assert_eq!(ids(&store), vec!["srv-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_error_leaves_store_untouched() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();
        let mut rx = store.subscribe();

        let err = reconciler
            .create(
                &store,
                |_| Err(DevhubError::validation("name is required")),
                resolves_after(1, "srv-1", "x"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DevhubError::Validation(_)));
        assert!(store.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_creates_resolve_independently() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();

        let (a, b) = tokio::join!(
            reconciler.create(&store, build("A"), resolves_after(10, "srv-1", "A")),
            reconciler.create(&store, build("B"), resolves_after(20, "srv-2", "B")),
        );
        assert_eq!(a.unwrap().id.as_str(), "srv-1");
        assert_eq!(b.unwrap().id.as_str(), "srv-2");

        let mut got = ids(&store);
        got.sort();
        assert_eq!(got, vec!["srv-1", "srv-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_does_not_affect_the_other() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();

        let (ok, failed) = tokio::join!(
            reconciler.create(&store, build("A"), resolves_after(30, "srv-1", "A")),
            reconciler.create(&store, build("B"), || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err::<Entity, _>(GatewayError::unknown("boom"))
            }),
        );
        assert!(ok.is_ok());
        assert!(failed.is_err());
        assert_eq!(ids(&store), vec!["srv-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_placeholder_at_commit_is_logged_not_raised() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();

        let task = {
            let store = store.clone();
            let reconciler = reconciler.clone();
            tokio::spawn(async move {
                reconciler
                    .create(&store, build("Foo"), resolves_after(50, "srv-9", "Foo"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.remove(&"temp-1".into());

        let out = task.await.unwrap().unwrap();
        assert_eq!(out.id.as_str(), "srv-9");
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_create_removes_placeholder() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();

        let task = {
            let store = store.clone();
            let reconciler = reconciler.clone();
            tokio::spawn(async move {
                reconciler
                    .create(&store, build("Foo"), || {
                        futures::future::pending::<std::result::Result<Entity, GatewayError>>()
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.len(), 1);

        task.abort();
        let _ = task.await;
        assert!(store.is_empty());
        assert!(reconciler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn adopt_inserts_late_success() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::new(ReconcilerOptions {
            late_arrival: LateArrival::Adopt,
            ..ReconcilerOptions::default()
        });

        let err = reconciler
            .perform_optimistic_create(
                &store,
                build("Foo"),
                resolves_after(150, "srv-late", "Foo"),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DevhubError::TimeoutExceeded { .. }));
        assert!(store.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ids(&store), vec!["srv-late"]);
        assert!(!store.list()[0].is_placeholder);
    }

    #[tokio::test(start_paused = true)]
    async fn discard_ignores_late_success() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();

        let _ = reconciler
            .perform_optimistic_create(
                &store,
                build("Foo"),
                resolves_after(150, "srv-late", "Foo"),
                Duration::from_millis(100),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_ids_are_never_reused() {
        let store = EntityStore::new("projects");
        let reconciler = Reconciler::default();
        let mut rx = store.subscribe();

        for _ in 0..3 {
            let _ = reconciler
                .create(&store, build("x"), || async {
                    Err::<Entity, _>(GatewayError::unknown("no"))
                })
                .await;
        }

        let mut inserted = Vec::new();
        while let Ok(change) = rx.try_recv() {
            if let StoreEvent::Inserted { id } = change.event {
                inserted.push(id.to_string());
            }
        }
        assert_eq!(inserted, vec!["temp-1", "temp-2", "temp-3"]);
    }
}
