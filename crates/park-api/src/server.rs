//! API server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::routes::create_router;
use crate::state::AppState;

/// HTTP server for the marketplace API.
#[derive(Debug, Clone)]
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a server over prepared state.
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Shared state.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Start the server and listen for connections.
    ///
    /// Runs until the server encounters a fatal error.
    pub async fn serve(&self, addr: SocketAddr) -> ApiResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::BindFailed(addr, e))?;

        info!(addr = %addr, backend = self.state.backend(), "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Start the server, shutting down when `shutdown` completes.
    pub async fn serve_with_shutdown<F>(&self, addr: SocketAddr, shutdown: F) -> ApiResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::BindFailed(addr, e))?;

        info!(addr = %addr, backend = self.state.backend(), "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }

    /// The router without a listener, for tests or embedding.
    pub fn router(&self) -> axum::Router {
        create_router(Arc::clone(&self.state))
    }
}
