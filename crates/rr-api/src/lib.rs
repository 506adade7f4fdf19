//! # rr-api
//!
//! The web routing and orchestration layer for Rusty-Reddit.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use rr_core::Forum;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub forum: Arc<Forum>,
}

impl AppState {
    pub fn new(forum: Forum) -> Self {
        Self { forum: Arc::new(forum) }
    }
}

/// Builds the forum router with tracing and CORS applied.
///
/// # Developer Note
/// The router is returned unbound so the binary (or a test) can nest it
/// under another prefix or serve it directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Front page, `?page=N`
        .route("/", get(handlers::frontpage))
        // Thread view (e.g., /comments/12)
        .route("/comments/{id}", get(handlers::view_thread))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/user/{username}", get(handlers::view_profile))
        .route("/profile/edit", post(handlers::edit_profile))
        .route("/submit", post(handlers::submit))
        // AJAX endpoints
        .route("/post/comment", post(handlers::post_comment))
        .route("/vote", post(handlers::vote))
        .route("/health", get(handlers::health))
        .layer(middleware::cors_policy())
        .layer(middleware::standard_middleware())
        .with_state(state)
}
