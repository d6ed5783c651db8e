use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::identity::record::{Identity, IdentityKind};
use crate::identity::store::{IdentityStore, NewIdentity, StoreError};

const COLUMNS: &str = "id, kind, name, email, password_hash, is_verified, is_active, \
     verification_token, verification_expires_at, \
     password_reset_token, reset_token_expires_at, \
     refresh_token, refresh_token_expires_at, \
     last_login_at, auth_provider, provider_id, created_at, updated_at";

/// Postgres-backed identity store.
#[derive(Clone)]
pub struct PgIdentityStore {
    db: PgPool,
}

impl PgIdentityStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_by_token(
        &self,
        column: &str,
        token: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM identities WHERE {column} = $1");
        let identity = sqlx::query_as::<_, Identity>(&sql)
            .bind(token)
            .fetch_optional(&self.db)
            .await
            .map_err(into_store_error)?;
        Ok(identity)
    }
}

fn require_row(result: sqlx::postgres::PgQueryResult) -> Result<(), StoreError> {
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

fn into_store_error(e: sqlx::Error) -> StoreError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return StoreError::Conflict;
        }
    }
    StoreError::Backend(e.into())
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO identities
                (kind, name, email, password_hash, is_verified,
                 verification_token, verification_expires_at, auth_provider, provider_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {COLUMNS}
            "#
        );
        let identity = sqlx::query_as::<_, Identity>(&sql)
            .bind(new.kind)
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.is_verified)
            .bind(&new.verification_token)
            .bind(new.verification_expires_at)
            .bind(&new.auth_provider)
            .bind(&new.provider_id)
            .fetch_one(&self.db)
            .await
            .map_err(into_store_error)?;
        Ok(identity)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM identities WHERE id = $1");
        let identity = sqlx::query_as::<_, Identity>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(into_store_error)?;
        Ok(identity)
    }

    async fn find_by_email(
        &self,
        kind: IdentityKind,
        email: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM identities WHERE kind = $1 AND email = $2");
        let identity = sqlx::query_as::<_, Identity>(&sql)
            .bind(kind)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .map_err(into_store_error)?;
        Ok(identity)
    }

    async fn find_by_email_any(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        // Standard first, then expert, mirroring the order the login flow
        // historically checked the two tables.
        let sql = format!(
            "SELECT {COLUMNS} FROM identities WHERE email = $1 \
             ORDER BY (kind = 'standard') DESC LIMIT 1"
        );
        let identity = sqlx::query_as::<_, Identity>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .map_err(into_store_error)?;
        Ok(identity)
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Identity>, StoreError> {
        self.fetch_one_by_token("verification_token", token).await
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Identity>, StoreError> {
        self.fetch_one_by_token("password_reset_token", token).await
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<Identity>, StoreError> {
        self.fetch_one_by_token("refresh_token", token).await
    }

    async fn find_by_provider(
        &self,
        kind: IdentityKind,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM identities \
             WHERE kind = $1 AND auth_provider = $2 AND provider_id = $3"
        );
        let identity = sqlx::query_as::<_, Identity>(&sql)
            .bind(kind)
            .bind(provider)
            .bind(provider_id)
            .fetch_optional(&self.db)
            .await
            .map_err(into_store_error)?;
        Ok(identity)
    }

    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError> {
        // Flag and token pair move together in one statement.
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET is_verified = TRUE,
                verification_token = NULL,
                verification_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(into_store_error)?;
        require_row(result)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET password_reset_token = $2,
                reset_token_expires_at = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(into_store_error)?;
        require_row(result)
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET password_hash = $2,
                password_reset_token = NULL,
                reset_token_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .map_err(into_store_error)?;
        require_row(result)
    }

    async fn set_refresh_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET refresh_token = $2,
                refresh_token_expires_at = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(into_store_error)?;
        require_row(result)
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE identities SET last_login_at = now(), updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(into_store_error)?;
        require_row(result)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM identities WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(into_store_error)?;
        require_row(result)
    }
}
