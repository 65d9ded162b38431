//! Local HTTP control surface
//!
//! Lets a browser or script drive the conversation and render its view:
//!
//! - `GET /health`
//! - `GET /api/view`
//! - `POST /api/listen`, `DELETE /api/listen`
//! - `PUT /api/transcript`
//! - `POST /api/display-mode`

pub mod control;
pub mod health;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::controller::ControllerHandle;
use crate::{Error, Result};

/// Full application router
pub fn router(handle: ControllerHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", control::router(handle))
        .merge(health::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Control API server
pub struct ApiServer {
    handle: ControllerHandle,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub const fn new(handle: ControllerHandle, port: u16) -> Self {
        Self { handle, port }
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind control server: {e}")))?;

        tracing::info!(port = self.port, "control server listening");

        axum::serve(listener, router(self.handle))
            .await
            .map_err(|e| Error::Config(format!("control server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
