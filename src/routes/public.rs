use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a bearer token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/register
        // Self-service signup for PATIENT and DOCTOR accounts. Returns a token.
        .route("/auth/register", post(handlers::register))
        // POST /auth/login
        .route("/auth/login", post(handlers::login))
}
