pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, patch};
use axum::Router;
use devhub_core::Workspace;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(workspace: Arc<Workspace>) -> Router {
    let app_state = state::AppState::new(workspace);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Projects
        .route(
            "/api/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            patch(routes::projects::update_project).delete(routes::projects::delete_project),
        )
        .route("/api/slots", get(routes::projects::list_slots))
        // Features, releases, notes
        .route(
            "/api/projects/{id}/{collection}",
            get(routes::children::list_children).post(routes::children::create_child),
        )
        .route(
            "/api/projects/{id}/{collection}/{child_id}",
            patch(routes::children::update_child).delete(routes::children::delete_child),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the devhub server on `port`.
pub async fn serve(workspace: Arc<Workspace>, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(workspace, listener, open_browser).await
}

/// Start the devhub server on a pre-bound listener.
///
/// Accepts a `TcpListener` that was already bound so the caller can read the
/// actual port before starting (useful when `port = 0`).
pub async fn serve_on(
    workspace: Arc<Workspace>,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(workspace);

    tracing::info!("devhub server listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}/api/projects");
        if let Err(e) = open::that(&url) {
            tracing::warn!(error = %e, "could not open browser");
        }
    }

    axum::serve(listener, app).await?;
    Ok(())
}
