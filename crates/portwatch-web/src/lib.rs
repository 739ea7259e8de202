//! PortWatch web façade
//!
//! The UI-facing surface: a per-process auth token, a websocket snapshot
//! stream, and the action endpoints that drive the orchestrator. Out of
//! scope per the external-collaborator boundary: static asset serving,
//! the tray/menubar launcher, and anything resembling a full admin UI --
//! this is the wire shape, not the production depth.

pub mod auth;
pub mod routes;
pub mod state;
pub mod websocket;

pub use state::AppState;

use std::net::SocketAddr;

/// Build the axum router over the given application state.
pub fn create_app(state: AppState) -> axum::Router {
    routes::build_router(state)
}

/// Bind and serve the web façade until the listener is closed.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = create_app(state);
    tracing::info!("starting web façade on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
