//! Access-control log routes
//!
//! Records entry/exit events at named physical gates and lists them for the
//! monitoring screens.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::domain::{
    AccessEvent, AccessEventWithPerson, GateDirection, PersonCategory, RecordAccessEventRequest,
};
use crate::error::ApiError;

#[derive(Debug, sqlx::FromRow)]
struct AccessEventRow {
    id: i64,
    person_id: i64,
    gate: String,
    direction: String,
    recorded_at: DateTime<Utc>,
    person_name: String,
    person_category: String,
}

impl AccessEventRow {
    fn into_item(self) -> Result<AccessEventWithPerson, ApiError> {
        let direction: GateDirection = self
            .direction
            .parse()
            .map_err(|e| ApiError::internal(format!("access event {}: {}", self.id, e)))?;
        let person_category: PersonCategory = self
            .person_category
            .parse()
            .map_err(|e| ApiError::internal(format!("access event {}: {}", self.id, e)))?;

        Ok(AccessEventWithPerson {
            event: AccessEvent {
                id: self.id,
                person_id: self.person_id,
                gate: self.gate,
                direction,
                recorded_at: self.recorded_at,
            },
            person_name: self.person_name,
            person_category,
        })
    }
}

/// POST /access-events
///
/// Record one gate event for a person.
pub async fn record_access_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordAccessEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.gate.trim().is_empty() {
        return Err(ApiError::bad_request("gate must not be blank"));
    }

    let person: Option<i64> = sqlx::query_scalar("SELECT id FROM people WHERE id = $1")
        .bind(req.person_id)
        .fetch_optional(&state.db)
        .await?;
    if person.is_none() {
        return Err(ApiError::not_found("Person not found"));
    }

    let (id, recorded_at): (i64, DateTime<Utc>) = sqlx::query_as(
        "INSERT INTO access_events (person_id, gate, direction) \
         VALUES ($1, $2, $3) \
         RETURNING id, recorded_at",
    )
    .bind(req.person_id)
    .bind(&req.gate)
    .bind(req.direction.as_str())
    .fetch_one(&state.db)
    .await?;

    info!(
        person_id = req.person_id,
        gate = %req.gate,
        direction = req.direction.as_str(),
        "access event recorded"
    );

    Ok(Created(DataResponse::new(AccessEvent {
        id,
        person_id: req.person_id,
        gate: req.gate,
        direction: req.direction,
        recorded_at,
    })))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListAccessEventsQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub person_id: Option<i64>,
    #[serde(default)]
    pub gate: Option<String>,
    #[serde(default)]
    pub direction: Option<GateDirection>,
}

/// GET /access-events
///
/// List gate events, newest first, with the person's display fields joined
/// on.
pub async fn list_access_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAccessEventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pagination = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    };
    let direction = query.direction.map(|d| d.as_str());

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM access_events \
         WHERE ($1::bigint IS NULL OR person_id = $1) \
         AND ($2::text IS NULL OR gate = $2) \
         AND ($3::text IS NULL OR direction = $3)",
    )
    .bind(query.person_id)
    .bind(&query.gate)
    .bind(direction)
    .fetch_one(&state.db)
    .await?;

    let rows = sqlx::query_as::<_, AccessEventRow>(
        "SELECT e.id, e.person_id, e.gate, e.direction, e.recorded_at, \
                p.first_name || ' ' || p.last_name AS person_name, \
                p.category AS person_category \
         FROM access_events e \
         JOIN people p ON p.id = e.person_id \
         WHERE ($1::bigint IS NULL OR e.person_id = $1) \
         AND ($2::text IS NULL OR e.gate = $2) \
         AND ($3::text IS NULL OR e.direction = $3) \
         ORDER BY e.recorded_at DESC, e.id DESC \
         LIMIT $4 OFFSET $5",
    )
    .bind(query.person_id)
    .bind(&query.gate)
    .bind(direction)
    .bind(pagination.limit() as i64)
    .bind(pagination.offset() as i64)
    .fetch_all(&state.db)
    .await?;

    let events = rows
        .into_iter()
        .map(AccessEventRow::into_item)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Paginated::new(events, &pagination, total as u64)))
}
