//! Admin routes
//!
//! Back-office endpoints for:
//! - Dashboard statistics
//! - Managing the admin user directory

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent};
use crate::app::AppState;
use crate::domain::{AdminStats, AdminUser, CreateAdminUserRequest};
use crate::error::ApiError;

// ============================================================================
// Admin Users
// ============================================================================

/// GET /admin/users
///
/// List every admin user, newest first.
pub async fn list_admin_users(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let users = sqlx::query_as::<_, AdminUser>(
        "SELECT id, email, display_name, created_at FROM admin_users ORDER BY created_at DESC, id",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(DataResponse::new(users)))
}

/// POST /admin/users
///
/// Register a new admin user. Email addresses are unique.
pub async fn create_admin_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAdminUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.email.trim().is_empty() {
        return Err(ApiError::bad_request("email must not be blank"));
    }
    if req.display_name.trim().is_empty() {
        return Err(ApiError::bad_request("display_name must not be blank"));
    }

    let user = sqlx::query_as::<_, AdminUser>(
        "INSERT INTO admin_users (id, email, display_name) \
         VALUES ($1, $2, $3) \
         RETURNING id, email, display_name, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(&req.email)
    .bind(&req.display_name)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::conflict("an admin user with this email already exists")
        }
        _ => ApiError::from(e),
    })?;

    info!(admin_user_id = %user.id, "admin user created");

    Ok(Created(DataResponse::new(user)))
}

/// DELETE /admin/users/:user_id
///
/// Remove an admin user from the directory.
pub async fn delete_admin_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM admin_users WHERE id = $1")
        .bind(user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Admin user not found"));
    }

    info!(admin_user_id = %user_id, "admin user deleted");

    Ok(NoContent)
}

// ============================================================================
// Admin Dashboard
// ============================================================================

/// GET /admin/stats
///
/// Get dashboard statistics.
pub async fn get_admin_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let staff: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM people WHERE category = 'staff'")
        .fetch_one(&state.db)
        .await
        .unwrap_or(0);

    let students: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM people WHERE category = 'student'")
            .fetch_one(&state.db)
            .await
            .unwrap_or(0);

    let parent_guardians: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM people WHERE category = 'parent_guardian'")
            .fetch_one(&state.db)
            .await
            .unwrap_or(0);

    let access_events_today: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM access_events WHERE recorded_at >= date_trunc('day', NOW())",
    )
    .fetch_one(&state.db)
    .await
    .unwrap_or(0);

    let admin_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_users")
        .fetch_one(&state.db)
        .await
        .unwrap_or(0);

    let stats = AdminStats {
        staff,
        students,
        parent_guardians,
        access_events_today,
        admin_users,
    };

    Ok(Json(DataResponse::new(stats)))
}
