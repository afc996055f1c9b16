use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::debug;
use waypoint_core::repository::Result;
use waypoint_core::{DurableStore, NewPermanentLink, PermanentLink, ShortCode, StorageError};

/// Postgres implementation of the durable store.
///
/// Rows live in the `links` table (see `ddl/postgres/links.sql`). `id` and
/// `created_at` come from column defaults, so pruning always compares
/// against the database clock. Inserts use `ON CONFLICT (code) DO NOTHING`
/// so the uniqueness check and the write are one statement.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store from an existing Postgres connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new Postgres connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_created_at(micros: i64) -> Result<Timestamp> {
    Timestamp::from_microsecond(micros).map_err(|e| {
        StorageError::InvalidData(format!("invalid created_at timestamp '{micros}': {e}"))
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn row_to_link(row: &PgRow) -> Result<PermanentLink> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let code: String = row.try_get("code").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
    let owner_id: String = row.try_get("user_id").map_err(map_sqlx_error)?;
    let created_at_us: i64 = row.try_get("created_at_us").map_err(map_sqlx_error)?;

    Ok(PermanentLink {
        id,
        code: ShortCode::new_unchecked(code),
        original_url,
        owner_id,
        created_at: parse_created_at(created_at_us)?,
    })
}

#[async_trait]
impl DurableStore for PostgresStore {
    async fn insert(&self, link: NewPermanentLink) -> Result<PermanentLink> {
        let result = sqlx::query(
            r#"
            INSERT INTO links (code, original_url, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO NOTHING
            RETURNING id::text AS id,
                      code,
                      original_url,
                      user_id,
                      (EXTRACT(EPOCH FROM created_at) * 1000000)::BIGINT AS created_at_us
            "#,
        )
        .bind(link.code.as_str())
        .bind(&link.original_url)
        .bind(&link.owner_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => row_to_link(&row),
            Ok(None) => Err(StorageError::Conflict(link.code.to_string())),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(link.code.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn get(&self, code: &ShortCode) -> Result<Option<PermanentLink>> {
        let row = sqlx::query(
            r#"
            SELECT id::text AS id,
                   code,
                   original_url,
                   user_id,
                   (EXTRACT(EPOCH FROM created_at) * 1000000)::BIGINT AS created_at_us
            FROM links
            WHERE code = $1
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_link).transpose()
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM links WHERE code = $1)")
            .bind(code.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(exists)
    }

    async fn prune_older_than(&self, age: Duration) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM links
            WHERE created_at < now() - make_interval(secs => $1)
            "#,
        )
        .bind(age.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let removed = result.rows_affected();
        debug!(removed, age_secs = age.as_secs(), "pruned links from postgres");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_at_micros_roundtrip() {
        let ts = parse_created_at(1_700_000_000_123_456).unwrap();
        assert_eq!(ts.as_microsecond(), 1_700_000_000_123_456);
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StorageError::Timeout(_)));
    }

    #[test]
    fn closed_pool_maps_to_unavailable() {
        let err = map_sqlx_error(sqlx::Error::PoolClosed);
        assert!(matches!(err, StorageError::Unavailable(_)));
    }

    #[test]
    fn missing_row_maps_to_invalid_data() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, StorageError::InvalidData(_)));
    }
}
