// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn scheduling_routes(state: Arc<AppConfig>) -> Router {
    // Slot and holiday configuration is staff-only
    let protected_routes = Router::new()
        .route("/slots", post(handlers::add_slot))
        .route("/slots", get(handlers::list_slots))
        .route("/slots/bulk", post(handlers::bulk_add_slots))
        .route("/slots/{slot_id}/deactivate", post(handlers::deactivate_slot))
        .route("/holidays/national", post(handlers::create_national_holiday))
        .route("/holidays/company", post(handlers::create_company_holiday))
        .route("/holidays/local", post(handlers::create_local_holiday))
        .route("/holidays", get(handlers::list_holidays))
        .route("/holidays/check", get(handlers::check_holiday))
        .route("/holidays/{holiday_id}", patch(handlers::update_holiday))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
