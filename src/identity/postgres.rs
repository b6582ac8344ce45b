//! Postgres-backed identity store.
//!
//! Schema lives in `sql/schema.sql` and is applied by [`PgIdentityStore::migrate`].
//! Rows are mapped through an explicit `FromRow` implementation so a column
//! type drift surfaces as a decode error.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};
use tracing::{info_span, Instrument};

use super::{CodeKind, Identity, IdentityStore, OutstandingCode, StoreError};

const SELECT_COLUMNS: &str = r"
    id, name, email, email_confirmed, password_hash, totp_required, totp_secret,
    recover_code_hash, recover_code_expires_at, delete_code_hash, delete_code_expires_at,
    email_code_hash, email_code_expires_at
";

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

struct IdentityRow(Identity);

fn code_pair(hash: Option<String>, expires_at: Option<i64>) -> Option<OutstandingCode> {
    match (hash, expires_at) {
        (Some(hash), Some(expires_at)) => Some(OutstandingCode { hash, expires_at }),
        _ => None,
    }
}

impl<'r> FromRow<'r, PgRow> for IdentityRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Identity {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            email_confirmed: row.try_get("email_confirmed")?,
            password_hash: row.try_get("password_hash")?,
            totp_required: row.try_get("totp_required")?,
            totp_secret: row.try_get("totp_secret")?,
            recover_code: code_pair(
                row.try_get("recover_code_hash")?,
                row.try_get("recover_code_expires_at")?,
            ),
            delete_code: code_pair(
                row.try_get("delete_code_hash")?,
                row.try_get("delete_code_expires_at")?,
            ),
            email_code: code_pair(
                row.try_get("email_code_hash")?,
                row.try_get("email_code_expires_at")?,
            ),
        }))
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Decode(format!("column {index}: {source}"))
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
        other => StoreError::Database(other),
    }
}

fn db_span(operation: &'static str) -> tracing::Span {
    info_span!("db.query", db.system = "postgresql", db.operation = operation)
}

#[derive(Clone, Debug)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `identities` table and its indexes when missing.
    ///
    /// # Errors
    /// Returns the database error if the schema cannot be applied.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::Executor::execute(&self.pool, SCHEMA_SQL)
            .instrument(db_span("CREATE"))
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn fetch_identity(&self, id: &str) -> Result<Identity, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM identities WHERE id = $1");
        sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .map(|row| row.0)
            .map_err(map_sqlx)
    }

    async fn fetch_identity_by_email_or_id(&self, key: &str) -> Result<Identity, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM identities
             WHERE id = $1 OR lower(email) = lower($1)
             ORDER BY (id = $1) DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(key)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .map(|row| row.0)
            .map_err(map_sqlx)
    }

    async fn create_identity(&self, identity: Identity) -> Result<Identity, StoreError> {
        let sql = format!(
            "INSERT INTO identities (id, name, email, email_confirmed, password_hash, totp_required, totp_secret)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {SELECT_COLUMNS}"
        );
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(&identity.id)
            .bind(&identity.name)
            .bind(&identity.email)
            .bind(identity.email_confirmed)
            .bind(&identity.password_hash)
            .bind(identity.totp_required)
            .bind(&identity.totp_secret)
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT"))
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(row.0)
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<Identity, StoreError> {
        let sql = format!(
            "UPDATE identities
             SET password_hash = $2, recover_code_hash = NULL, recover_code_expires_at = NULL,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {SELECT_COLUMNS}"
        );
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .bind(password_hash)
            .fetch_one(&mut *tx)
            .instrument(db_span("UPDATE"))
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(row.0)
    }

    async fn update_totp(
        &self,
        id: &str,
        encrypted_secret: Option<String>,
        required: bool,
    ) -> Result<Identity, StoreError> {
        let sql = format!(
            "UPDATE identities
             SET totp_secret = $2, totp_required = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING {SELECT_COLUMNS}"
        );
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .bind(encrypted_secret)
            .bind(required)
            .fetch_one(&mut *tx)
            .instrument(db_span("UPDATE"))
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(row.0)
    }

    async fn update_outstanding_code(
        &self,
        id: &str,
        kind: CodeKind,
        code: OutstandingCode,
    ) -> Result<Identity, StoreError> {
        let assignments = match kind {
            CodeKind::Recover => "recover_code_hash = $2, recover_code_expires_at = $3",
            CodeKind::Delete => "delete_code_hash = $2, delete_code_expires_at = $3",
            CodeKind::Email => "email_code_hash = $2, email_code_expires_at = $3",
        };
        let sql = format!(
            "UPDATE identities SET {assignments}, updated_at = NOW()
             WHERE id = $1
             RETURNING {SELECT_COLUMNS}"
        );
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .bind(&code.hash)
            .bind(code.expires_at)
            .fetch_one(&mut *tx)
            .instrument(db_span("UPDATE"))
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(row.0)
    }

    async fn clear_outstanding_code(
        &self,
        id: &str,
        kind: CodeKind,
        expected_hash: &str,
    ) -> Result<bool, StoreError> {
        let sql = match kind {
            CodeKind::Recover => {
                "UPDATE identities
                 SET recover_code_hash = NULL, recover_code_expires_at = NULL, updated_at = NOW()
                 WHERE id = $1 AND recover_code_hash = $2"
            }
            CodeKind::Delete => {
                "UPDATE identities
                 SET delete_code_hash = NULL, delete_code_expires_at = NULL, updated_at = NOW()
                 WHERE id = $1 AND delete_code_hash = $2"
            }
            CodeKind::Email => {
                "UPDATE identities
                 SET email_code_hash = NULL, email_code_expires_at = NULL, updated_at = NOW()
                 WHERE id = $1 AND email_code_hash = $2"
            }
        };
        let result = sqlx::query(sql)
            .bind(id)
            .bind(expected_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE"))
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_identity(&self, id: &str, expected_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM identities WHERE id = $1 AND delete_code_hash = $2")
            .bind(id)
            .bind(expected_hash)
            .execute(&self.pool)
            .instrument(db_span("DELETE"))
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_email(
        &self,
        id: &str,
        email: &str,
        expected_hash: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let sql = format!(
            "UPDATE identities
             SET email = $2, email_confirmed = TRUE,
                 email_code_hash = NULL, email_code_expires_at = NULL, updated_at = NOW()
             WHERE id = $1 AND email_code_hash = $3
             RETURNING {SELECT_COLUMNS}"
        );
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .bind(email)
            .bind(expected_hash)
            .fetch_optional(&mut *tx)
            .instrument(db_span("UPDATE"))
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(row.map(|row| row.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_pair_requires_both_columns() {
        assert_eq!(code_pair(None, None), None);
        assert_eq!(code_pair(Some("h".to_string()), None), None);
        assert_eq!(code_pair(None, Some(5)), None);
        assert_eq!(
            code_pair(Some("h".to_string()), Some(5)),
            Some(OutstandingCode {
                hash: "h".to_string(),
                expires_at: 5
            })
        );
    }

    #[test]
    fn schema_declares_every_selected_column() {
        for column in SELECT_COLUMNS.split(',').map(str::trim) {
            assert!(SCHEMA_SQL.contains(column), "{column}");
        }
        assert!(SCHEMA_SQL.contains("CREATE TABLE IF NOT EXISTS identities"));
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(map_sqlx(sqlx::Error::RowNotFound).is_not_found());
        assert!(matches!(
            map_sqlx(sqlx::Error::PoolTimedOut),
            StoreError::Database(_)
        ));
    }
}
