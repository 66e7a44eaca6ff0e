//! Admin domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Administrative user record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AdminUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Request DTO for creating an admin user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAdminUserRequest {
    pub email: String,
    pub display_name: String,
}

/// Aggregate dashboard counts
#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub staff: i64,
    pub students: i64,
    pub parent_guardians: i64,
    pub access_events_today: i64,
    pub admin_users: i64,
}
