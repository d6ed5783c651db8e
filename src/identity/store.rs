use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::identity::record::{Identity, IdentityKind};

/// Errors surfaced by an identity store adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The email already exists under the same kind. An email existing under
    /// the *other* kind is not a conflict.
    #[error("email already registered")]
    Conflict,
    #[error("identity not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Fields required to create a new identity record.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub kind: IdentityKind,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<OffsetDateTime>,
    pub auth_provider: Option<String>,
    pub provider_id: Option<String>,
}

/// Persistence contract over the identity records.
///
/// Lookups by token search across both kinds; the returned record carries its
/// own kind tag so callers always mutate the right rows. Every mutator that
/// touches a token column writes the token and its expiry in one statement,
/// so a half-written pair is never observable.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;
    async fn find_by_email(
        &self,
        kind: IdentityKind,
        email: &str,
    ) -> Result<Option<Identity>, StoreError>;
    /// Cross-kind email lookup. If the email exists under both kinds the
    /// standard record wins, matching the order the login flow checks tables.
    async fn find_by_email_any(&self, email: &str) -> Result<Option<Identity>, StoreError>;
    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Identity>, StoreError>;
    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Identity>, StoreError>;
    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<Identity>, StoreError>;
    async fn find_by_provider(
        &self,
        kind: IdentityKind,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<Identity>, StoreError>;

    /// Sets `is_verified` and clears the verification token pair.
    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError>;
    /// Issues (or supersedes) the reset token pair.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;
    /// Stores a new password hash and clears the reset token pair.
    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError>;
    /// Issues (or supersedes) the refresh token pair.
    async fn set_refresh_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;
    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}
