//! People routes
//!
//! The batch import endpoint plus CRUD over person records. Batch import is
//! the only way to create people; it resolves same-batch guardian references
//! in two phases (guardians first, students second).

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::domain::{
    validate_batch, ImportBatchRequest, Person, PersonCategory, PersonDetails,
    UpdatePersonRequest,
};
use crate::error::ApiError;
use crate::middleware::RequestIdExt;
use crate::services::importer::{ImportError, ImportOutcome};
use crate::services::{BatchImporter, PgPeopleStore};

// ============================================================================
// Database Row Types
// ============================================================================

const PERSON_COLUMNS: &str = "id, category, first_name, last_name, image, role, class_label, \
     guardian_ids, bio, external_roster_id, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct PersonRow {
    id: i64,
    category: String,
    first_name: String,
    last_name: String,
    image: Option<String>,
    role: Option<String>,
    class_label: Option<String>,
    guardian_ids: Vec<i64>,
    bio: String,
    external_roster_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PersonRow {
    /// Rebuild the typed record from the flat columns. The category decides
    /// which of the nullable columns are meaningful.
    fn into_person(self) -> Result<Person, ApiError> {
        let category: PersonCategory = self
            .category
            .parse()
            .map_err(|e| ApiError::internal(format!("person {}: {}", self.id, e)))?;

        let details = match category {
            PersonCategory::Staff => PersonDetails::Staff { role: self.role },
            PersonCategory::ParentGuardian => PersonDetails::ParentGuardian { role: self.role },
            PersonCategory::Student => PersonDetails::Student {
                class_label: self.class_label,
                guardian_ids: self.guardian_ids,
            },
        };

        Ok(Person {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            image: self.image,
            details,
            bio: self.bio,
            external_roster_id: self.external_roster_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ============================================================================
// Batch Import
// ============================================================================

/// Acknowledgment body for a persisted batch. Carries counts only; clients
/// that need the new ids fetch them through the list endpoint.
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub guardians_created: usize,
    pub students_created: usize,
    pub dropped_guardian_refs: usize,
}

impl From<&ImportOutcome> for ImportSummary {
    fn from(outcome: &ImportOutcome) -> Self {
        Self {
            created: outcome.created(),
            guardians_created: outcome.created_guardian_ids.len(),
            students_created: outcome.created_student_ids.len(),
            dropped_guardian_refs: outcome.dropped_guardian_refs,
        }
    }
}

/// POST /people/batch
///
/// Create a mixed batch of people in one call. Guardian-capable submissions
/// are persisted first so that students in the same batch can reference them
/// by temp id.
pub async fn import_people_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ImportBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_batch(&req.people).map_err(ApiError::bad_request)?;

    info!(
        request_id = ?headers.request_id(),
        submissions = req.people.len(),
        "received people batch"
    );

    let importer = BatchImporter::new(
        state.bio.clone(),
        state.roster.clone(),
        PgPeopleStore::new(state.db.clone()),
        state.settings.dangling_guardian_refs,
    );

    let outcome = importer.import(req.people).await.map_err(|e| match e {
        ImportError::DanglingGuardianRef { .. } => ApiError::bad_request(e.to_string()),
        ImportError::Persistence { detail } => ApiError::persistence(detail),
    })?;

    Ok(Created(DataResponse::new(ImportSummary::from(&outcome))))
}

// ============================================================================
// CRUD
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ListPeopleQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub category: Option<PersonCategory>,
    /// Case-insensitive substring match on first or last name.
    #[serde(default)]
    pub q: Option<String>,
}

/// GET /people
///
/// List people with optional category filter and name search.
pub async fn list_people(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPeopleQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pagination = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    };
    let category = query.category.map(|c| c.as_str());
    let q = query.q.as_deref().filter(|s| !s.trim().is_empty());

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM people \
         WHERE ($1::text IS NULL OR category = $1) \
         AND ($2::text IS NULL OR (first_name ILIKE '%' || $2 || '%' \
              OR last_name ILIKE '%' || $2 || '%'))",
    )
    .bind(category)
    .bind(q)
    .fetch_one(&state.db)
    .await?;

    let select = format!(
        "SELECT {PERSON_COLUMNS} FROM people \
         WHERE ($1::text IS NULL OR category = $1) \
         AND ($2::text IS NULL OR (first_name ILIKE '%' || $2 || '%' \
              OR last_name ILIKE '%' || $2 || '%')) \
         ORDER BY last_name, first_name, id \
         LIMIT $3 OFFSET $4"
    );
    let rows = sqlx::query_as::<_, PersonRow>(&select)
        .bind(category)
        .bind(q)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&state.db)
        .await?;

    let people = rows
        .into_iter()
        .map(PersonRow::into_person)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Paginated::new(people, &pagination, total as u64)))
}

/// GET /people/:person_id
pub async fn get_person(
    State(state): State<Arc<AppState>>,
    Path(person_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let select = format!("SELECT {PERSON_COLUMNS} FROM people WHERE id = $1");
    let row = sqlx::query_as::<_, PersonRow>(&select)
        .bind(person_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Person not found"))?;

    Ok(Json(DataResponse::new(row.into_person()?)))
}

/// GET /people/:person_id/guardians
///
/// The guardian profiles referenced by a student, in stored order. Empty for
/// people of other categories.
pub async fn get_person_guardians(
    State(state): State<Arc<AppState>>,
    Path(person_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let select = format!("SELECT {PERSON_COLUMNS} FROM people WHERE id = $1");
    let row = sqlx::query_as::<_, PersonRow>(&select)
        .bind(person_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Person not found"))?;

    let person = row.into_person()?;
    let guardian_ids = person.guardian_ids();
    if guardian_ids.is_empty() {
        return Ok(Json(DataResponse::new(Vec::<Person>::new())));
    }

    let select = format!("SELECT {PERSON_COLUMNS} FROM people WHERE id = ANY($1)");
    let rows = sqlx::query_as::<_, PersonRow>(&select)
        .bind(guardian_ids.to_vec())
        .fetch_all(&state.db)
        .await?;

    let mut by_id: HashMap<i64, Person> = HashMap::new();
    for row in rows {
        let guardian = row.into_person()?;
        by_id.insert(guardian.id, guardian);
    }

    // ANY($1) does not preserve order; put the rows back in stored order.
    let guardians: Vec<Person> = guardian_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect();

    Ok(Json(DataResponse::new(guardians)))
}

/// PATCH /people/:person_id
///
/// Partial update. Category is immutable; a field that does not apply to the
/// person's category is rejected. The whole read-validate-write sequence runs
/// in one transaction with the row locked, so concurrent updates and deletes
/// cannot interleave with it.
pub async fn update_person(
    State(state): State<Arc<AppState>>,
    Path(person_id): Path<i64>,
    Json(req): Json<UpdatePersonRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = state.db.begin().await?;

    let select = format!("SELECT {PERSON_COLUMNS} FROM people WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, PersonRow>(&select)
        .bind(person_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Person not found"))?;
    let mut person = row.into_person()?;

    if let Some(first_name) = req.first_name {
        if first_name.trim().is_empty() {
            return Err(ApiError::bad_request("first_name must not be blank"));
        }
        person.first_name = first_name;
    }
    if let Some(last_name) = req.last_name {
        if last_name.trim().is_empty() {
            return Err(ApiError::bad_request("last_name must not be blank"));
        }
        person.last_name = last_name;
    }
    if let Some(image) = req.image {
        person.image = Some(image);
    }

    match &mut person.details {
        PersonDetails::Staff { role } | PersonDetails::ParentGuardian { role } => {
            if req.class_label.is_some() {
                return Err(ApiError::bad_request("class applies only to students"));
            }
            if req.guardian_ids.is_some() {
                return Err(ApiError::bad_request("guardian_ids applies only to students"));
            }
            if let Some(new_role) = req.role {
                *role = Some(new_role);
            }
        }
        PersonDetails::Student {
            class_label,
            guardian_ids,
        } => {
            if req.role.is_some() {
                return Err(ApiError::bad_request("role does not apply to students"));
            }
            if let Some(new_class) = req.class_label {
                *class_label = Some(new_class);
            }
            if let Some(new_guardians) = req.guardian_ids {
                let mut seen = HashSet::new();
                let deduped: Vec<i64> = new_guardians
                    .into_iter()
                    .filter(|id| seen.insert(*id))
                    .collect();
                if deduped.is_empty() {
                    return Err(ApiError::bad_request(
                        "a student needs at least one guardian reference",
                    ));
                }

                // The referenced rows stay locked until commit; a delete that
                // lands afterwards still scrubs this student's list.
                let found: Vec<(i64, String)> = sqlx::query_as(
                    "SELECT id, category FROM people WHERE id = ANY($1) FOR KEY SHARE",
                )
                .bind(deduped.clone())
                .fetch_all(&mut *tx)
                .await?;
                let mut categories: HashMap<i64, PersonCategory> = HashMap::new();
                for (id, category) in found {
                    let category: PersonCategory = category
                        .parse()
                        .map_err(|e| ApiError::internal(format!("person {id}: {e}")))?;
                    categories.insert(id, category);
                }
                for id in &deduped {
                    match categories.get(id) {
                        None => {
                            return Err(ApiError::bad_request(format!(
                                "guardian id {id} does not reference an existing person"
                            )))
                        }
                        Some(category) if !category.is_guardian_capable() => {
                            return Err(ApiError::bad_request(format!(
                                "guardian id {id} references a student and cannot be a guardian"
                            )))
                        }
                        Some(_) => {}
                    }
                }

                *guardian_ids = deduped;
            }
        }
    }

    let updated_at: DateTime<Utc> = sqlx::query_scalar(
        "UPDATE people SET first_name = $1, last_name = $2, image = $3, role = $4, \
         class_label = $5, guardian_ids = $6, updated_at = NOW() \
         WHERE id = $7 \
         RETURNING updated_at",
    )
    .bind(&person.first_name)
    .bind(&person.last_name)
    .bind(person.image.as_deref())
    .bind(person.details.role())
    .bind(person.details.class_label())
    .bind(person.details.guardian_ids().to_vec())
    .bind(person_id)
    .fetch_one(&mut *tx)
    .await?;
    person.updated_at = updated_at;

    tx.commit().await?;

    Ok(Json(DataResponse::new(person)))
}

/// DELETE /people/:person_id
///
/// Delete a person and scrub their id from every student's guardian list, in
/// one transaction.
pub async fn delete_person(
    State(state): State<Arc<AppState>>,
    Path(person_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = state.db.begin().await?;

    let deleted = sqlx::query("DELETE FROM people WHERE id = $1")
        .bind(person_id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Person not found"));
    }

    sqlx::query(
        "UPDATE people SET guardian_ids = array_remove(guardian_ids, $1), \
         updated_at = NOW() \
         WHERE $1 = ANY(guardian_ids)",
    )
    .bind(person_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(person_id, "person deleted and guardian references scrubbed");
    Ok(NoContent)
}
