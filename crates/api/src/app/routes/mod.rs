use axum::{routing::get, Router};

pub mod lessons;
pub mod orders;
pub mod system;

/// Router for everything under `/api`.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/lessons", lessons::router())
        .nest("/orders", orders::router())
}
