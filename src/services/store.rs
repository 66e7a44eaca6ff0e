//! People store used by the batch importer.
//!
//! The importer talks to persistence through the [`PeopleStore`] trait so
//! tests can substitute an in-memory fake. The production implementation is
//! [`PgPeopleStore`], a thin wrapper over the shared connection pool.

use sqlx::PgPool;

use crate::domain::NewPerson;

/// Error from the people store. Carries the diagnostic the batch response
/// surfaces in its `detail` field.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self(e.to_string())
    }
}

/// Persistence seam for the batch importer.
pub trait PeopleStore: Send + Sync {
    /// Insert the given rows in one operation. The returned ids correspond to
    /// `rows` positionally, so callers can zip them back together.
    fn insert_people(
        &self,
        rows: &[NewPerson],
    ) -> impl std::future::Future<Output = Result<Vec<i64>, StoreError>> + Send;

    /// Remove previously inserted rows. Used to undo the guardian phase when
    /// the student phase fails.
    fn delete_people(
        &self,
        ids: &[i64],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Postgres-backed people store.
#[derive(Clone)]
pub struct PgPeopleStore {
    db: PgPool,
}

impl PgPeopleStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

impl PeopleStore for PgPeopleStore {
    async fn insert_people(&self, rows: &[NewPerson]) -> Result<Vec<i64>, StoreError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }

        // Multi-row VALUES built by hand because guardian_ids is an array
        // column and UNNEST cannot carry one array per row. RETURNING emits
        // ids in VALUES order for a plain insert; the temp-id mapping in the
        // importer depends on that.
        let mut placeholders = Vec::with_capacity(rows.len());
        for i in 0..rows.len() {
            let base = i * 9;
            placeholders.push(format!(
                "(${}, ${}, ${}, ${}, ${}, ${}, ${}, ${}, ${})",
                base + 1,
                base + 2,
                base + 3,
                base + 4,
                base + 5,
                base + 6,
                base + 7,
                base + 8,
                base + 9,
            ));
        }

        let query = format!(
            "INSERT INTO people \
                (category, first_name, last_name, image, role, class_label, \
                 guardian_ids, bio, external_roster_id) \
             VALUES {} \
             RETURNING id",
            placeholders.join(", ")
        );

        let mut insert = sqlx::query_scalar::<_, i64>(&query);
        for row in rows {
            insert = insert
                .bind(row.category().as_str())
                .bind(&row.first_name)
                .bind(&row.last_name)
                .bind(row.image.as_deref())
                .bind(row.details.role())
                .bind(row.details.class_label())
                .bind(row.details.guardian_ids().to_vec())
                .bind(&row.bio)
                .bind(&row.external_roster_id);
        }

        let ids = insert.fetch_all(&self.db).await?;
        Ok(ids)
    }

    async fn delete_people(&self, ids: &[i64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM people WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
