//! HTTP routes.

pub mod auth;
pub mod health;
pub mod proxy;

pub use auth::{
    CallbackQuery, CallbackResponse, LoginQuery, LogoutResponse, SessionStatus, callback_handler,
    login_handler, logout_handler, session_status_handler,
};
pub use health::{HealthResponse, health_routes};
pub use proxy::{API_PREFIX, proxy_handler};

use axum::{
    Router, middleware,
    routing::{any, get, post},
};

use crate::state::AppState;

/// Login flow routes. No session required.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/session", get(session_status_handler))
}

/// Proxied API routes behind the session/CSRF middleware.
pub fn proxy_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(API_PREFIX, any(proxy_handler))
        .route("/api/{*rest}", any(proxy_handler))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::auth::session_middleware,
        ))
}
