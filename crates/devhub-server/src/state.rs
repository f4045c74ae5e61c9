use devhub_core::Workspace;
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub workspace: Arc<Workspace>,
}

impl AppState {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}
