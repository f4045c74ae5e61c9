//! Entity store and optimistic mutation reconciler.
//!
//! ```text
//!   Workspace ──► Reconciler ──► EntityStore ──► ChangeBus ──► subscribers
//!       │             │
//!       └─────────────┴──► RemoteGateway (InMemoryGateway | RestGateway)
//! ```
//!
//! Creates show a placeholder immediately and reconcile it with the remote
//! store's answer, or remove it on rejection or timeout.

pub mod config;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod model;
pub mod placeholder;
pub mod reconciler;
pub mod slots;
pub mod store;
pub mod templates;
pub mod types;
pub mod workspace;

pub use entity::{Entity, EntityId, Fields};
pub use error::{DevhubError, Result};
pub use gateway::{GatewayError, GatewayErrorKind, ListFilter, RemoteGateway};
pub use reconciler::{Reconciler, ReconcilerOptions};
pub use store::{EntityStore, StoreChange, StoreEvent};
pub use workspace::Workspace;
