use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use scheduling_cell::router::scheduling_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Branch appointments API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/schedule", scheduling_routes(state.clone()))
}
