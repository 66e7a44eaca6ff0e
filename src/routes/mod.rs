pub mod access;
pub mod admin;
pub mod health;
pub mod people;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Health
        .route("/health", get(health::health_check))
        // People
        .route("/people/batch", post(people::import_people_batch))
        .route("/people", get(people::list_people))
        .route("/people/:person_id", get(people::get_person))
        .route("/people/:person_id", patch(people::update_person))
        .route("/people/:person_id", delete(people::delete_person))
        .route(
            "/people/:person_id/guardians",
            get(people::get_person_guardians),
        )
        // Access events
        .route("/access-events", post(access::record_access_event))
        .route("/access-events", get(access::list_access_events))
        // Admin
        .route("/admin/users", get(admin::list_admin_users))
        .route("/admin/users", post(admin::create_admin_user))
        .route("/admin/users/:user_id", delete(admin::delete_admin_user))
        .route("/admin/stats", get(admin::get_admin_stats))
}
