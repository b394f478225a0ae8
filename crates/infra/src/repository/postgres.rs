//! Postgres-backed primary store.
//!
//! All record types share one `entity_records` table: the JSON body lives in a JSONB
//! column next to a `BIGSERIAL` identity, so identities are unique across types.
//! Sorting reads straight out of the body (`body->'field'`) and only accepts fields
//! the record type whitelists, which keeps user input out of the generated SQL.

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use campus_core::{Direction, Entity, EntityId, Page, PageRequest};

use super::{check_sort, EntityRepository, RepositoryError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS entity_records (
        id          BIGSERIAL PRIMARY KEY,
        entity_type TEXT        NOT NULL,
        body        JSONB       NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS entity_records_type_idx ON entity_records (entity_type, id)",
];

/// Create the `entity_records` table if it does not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), RepositoryError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    Ok(())
}

/// SQLSTATE raised by `nextval` once the identity sequence hits its maximum.
const SEQUENCE_LIMIT_EXCEEDED: &str = "2200H";

fn map_sqlx_error(operation: &str, e: sqlx::Error) -> RepositoryError {
    tracing::error!(operation, error = %e, "postgres operation failed");
    RepositoryError::Storage(format!("{operation}: {e}"))
}

/// Postgres-backed repository for one record type.
pub struct PostgresEntityRepository<E> {
    pool: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> PostgresEntityRepository<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }
}

impl<E> Clone for PostgresEntityRepository<E> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl<E: Entity> PostgresEntityRepository<E> {
    fn to_body(entity: &E) -> Result<serde_json::Value, RepositoryError> {
        serde_json::to_value(entity).map_err(|e| RepositoryError::Serialization(e.to_string()))
    }

    fn from_body(body: serde_json::Value) -> Result<E, RepositoryError> {
        serde_json::from_value(body).map_err(|e| RepositoryError::Serialization(e.to_string()))
    }

    async fn next_id(&self) -> Result<EntityId, RepositoryError> {
        let row = sqlx::query("SELECT nextval(pg_get_serial_sequence('entity_records', 'id')) AS id")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some(SEQUENCE_LIMIT_EXCEEDED) => {
                    RepositoryError::SequenceExhausted
                }
                _ => map_sqlx_error("next_id", e),
            })?;
        let id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("next_id", e))?;
        Ok(EntityId::new(id))
    }

    /// Upsert under a caller-chosen identity, then pull the sequence forward so
    /// generated identities never collide with it.
    async fn upsert_explicit(&self, id: EntityId, body: serde_json::Value) -> Result<(), RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO entity_records (id, entity_type, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
                SET body = EXCLUDED.body, updated_at = NOW()
                WHERE entity_records.entity_type = EXCLUDED.entity_type
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(id.get())
        .bind(E::NAME)
        .bind(body)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save", e))?;

        let Some(row) = row else {
            return Err(RepositoryError::IdentityConflict(id));
        };
        let inserted: bool = row.try_get("inserted").map_err(|e| map_sqlx_error("save", e))?;
        if inserted {
            sqlx::query(
                r#"
                SELECT setval(
                    pg_get_serial_sequence('entity_records', 'id'),
                    (SELECT GREATEST(MAX(id), 1) FROM entity_records)
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("save", e))?;
        }
        Ok(())
    }
}

fn order_by_clause(request: &PageRequest) -> String {
    let mut clauses: Vec<String> = request
        .sort
        .iter()
        .filter(|o| o.field != "id")
        .map(|o| {
            // Missing keys and JSON nulls both sort as SQL NULL.
            let nulls = match o.direction {
                Direction::Asc => "NULLS LAST",
                Direction::Desc => "NULLS FIRST",
            };
            format!(
                "NULLIF(body->'{}', 'null'::jsonb) {} {}",
                o.field,
                o.direction.as_str().to_uppercase(),
                nulls
            )
        })
        .collect();

    let id_direction = request
        .sort
        .iter()
        .find(|o| o.field == "id")
        .map(|o| o.direction)
        .unwrap_or(Direction::Asc);
    clauses.push(format!("id {}", id_direction.as_str().to_uppercase()));
    clauses.join(", ")
}

#[async_trait]
impl<E: Entity> EntityRepository<E> for PostgresEntityRepository<E> {
    #[instrument(skip(self, entity), fields(entity = E::NAME))]
    async fn save(&self, mut entity: E) -> Result<E, RepositoryError> {
        match entity.id() {
            Some(id) => {
                let body = Self::to_body(&entity)?;
                self.upsert_explicit(id, body).await?;
            }
            None => {
                let id = self.next_id().await?;
                entity.assign_id(id);
                let body = Self::to_body(&entity)?;
                sqlx::query("INSERT INTO entity_records (id, entity_type, body) VALUES ($1, $2, $3)")
                    .bind(id.get())
                    .bind(E::NAME)
                    .bind(body)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("save", e))?;
            }
        }
        Ok(entity)
    }

    #[instrument(skip(self), fields(entity = E::NAME))]
    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM entity_records WHERE entity_type = $1 AND id = $2")
            .bind(E::NAME)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;

        match row {
            Some(row) => {
                let body: serde_json::Value =
                    row.try_get("body").map_err(|e| map_sqlx_error("find_by_id", e))?;
                Ok(Some(Self::from_body(body)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, request), fields(entity = E::NAME, page = request.page, size = request.size))]
    async fn find_all(&self, request: &PageRequest) -> Result<Page<E>, RepositoryError> {
        check_sort::<E>(request)?;
        let total = self.count().await?;

        let sql = format!(
            "SELECT body FROM entity_records WHERE entity_type = $1 ORDER BY {} LIMIT $2 OFFSET $3",
            order_by_clause(request)
        );
        let offset = i64::try_from(request.offset()).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql)
            .bind(E::NAME)
            .bind(i64::from(request.size))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_all", e))?;

        let mut content = Vec::with_capacity(rows.len());
        for row in rows {
            let body: serde_json::Value =
                row.try_get("body").map_err(|e| map_sqlx_error("find_all", e))?;
            content.push(Self::from_body(body)?);
        }
        Ok(Page::new(content, total, request.clone()))
    }

    #[instrument(skip(self), fields(entity = E::NAME))]
    async fn delete(&self, id: EntityId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM entity_records WHERE entity_type = $1 AND id = $2")
            .bind(E::NAME)
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM entity_records WHERE entity_type = $1")
            .bind(E::NAME)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;
        let total: i64 = row.try_get("total").map_err(|e| map_sqlx_error("count", e))?;
        Ok(u64::try_from(total).unwrap_or(0))
    }
}
