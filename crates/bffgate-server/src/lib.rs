//! HTTP server for bffgate.
//!
//! This crate is the browser-facing side of the gateway: it runs the OIDC
//! authorization code flow, keeps tokens in the session store, and forwards
//! `/api/*` to the upstream API with the session's access token attached.
//!
//! # Features
//!
//! - Authorization code flow with PKCE (`/auth/login`, `/auth/callback`)
//! - Opaque session cookie plus a script-readable CSRF companion cookie
//! - CSRF header check on state-changing requests
//! - Token refresh before forwarding, and once on upstream 401
//! - Streaming reverse proxy with hop-by-hop header handling
//! - Graceful shutdown with a bounded drain period
//!
//! # Example
//!
//! ```ignore
//! use bffgate_server::{AppState, Server, ServerConfig};
//!
//! let config = ServerConfig::new("http://orders:9000".parse()?);
//! let state = AppState::new(config, oidc_client, store, cookie_key)?;
//!
//! Server::new(state).run().await?;
//! ```

pub mod auth;
pub mod config;
pub mod cookies;
pub mod error;
pub mod flow;
pub mod refresh;
pub mod request_log;
pub mod routes;
pub mod state;
pub mod upstream;

pub use auth::session_middleware;
pub use config::{CookieSettings, ServerConfig};
pub use error::{BffError, ErrorResponse, Result, ServerError};
pub use flow::{FlowEvent, FlowState};
pub use request_log::request_logging_middleware;
pub use state::AppState;

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;

use axum::{Router, middleware};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// The bffgate HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::health_routes())
            .merge(routes::auth_routes())
            .merge(routes::proxy_routes(self.state.clone()))
            .layer(RequestBodyLimitLayer::new(self.state.config.max_body_size))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                request_log::request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let addr = self.bind_address();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// After the signal, in-flight requests get the configured grace period
    /// to finish; connections still open after that are dropped.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let grace = self.state.config.shutdown_grace;
        let router = self.router();

        if let Ok(addr) = listener.local_addr() {
            info!("Starting server on {}", addr);
        }

        let draining = CancellationToken::new();
        let trigger = draining.clone();

        let serve = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown signal received; draining in-flight requests");
                trigger.cancel();
            })
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result.map_err(ServerError::Serve)?,
            _ = async {
                draining.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed; closing remaining connections");
            }
        }

        info!("Server stopped");
        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
