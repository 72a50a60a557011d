mod handlers;
mod middleware;
mod server;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::pipeline::Pipeline;

pub use server::{ConnectionAborted, serve, serve_with_shutdown};

#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Arc<Pipeline>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route(
            "/",
            post(handlers::render_document).layer(DefaultBodyLimit::disable()),
        )
        .route("/_health", get(handlers::health))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
}
