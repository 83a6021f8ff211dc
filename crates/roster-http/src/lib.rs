//! HTTP shell over [`roster_core::service::RosterService`].
//!
//! Routes map 1:1 onto the service operations; `/parse_stream` carries
//! progress frames as server-sent events.

mod error;
mod routes;

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use roster_core::service::RosterService;

pub use error::{status_for, ApiError};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RosterService>,
}

/// Build the router (shared between the binary and tests).
pub fn build_router(service: Arc<RosterService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::health))
        .route("/send_code", post(routes::send_code))
        .route("/verify_code", post(routes::verify_code))
        .route("/verify_2fa", post(routes::verify_two_factor))
        .route("/get_chats", post(routes::get_chats))
        .route("/parse", post(routes::parse))
        .route("/parse_stream", post(routes::parse_stream))
        .route("/export", post(routes::export))
        .route("/disconnect", post(routes::disconnect))
        .layer(cors)
        .with_state(AppState { service })
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    service: Arc<RosterService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, build_router(service))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
