use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Which identity table an account lives in. Farmers register as `Standard`,
/// agronomists and other domain experts as `Expert`. The same email may exist
/// under both kinds; uniqueness is per kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "identity_kind", rename_all = "lowercase")]
pub enum IdentityKind {
    Standard,
    Expert,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Standard => "standard",
            IdentityKind::Expert => "expert",
        }
    }
}

/// Identity record in the database.
///
/// Each of the three token columns is paired with its expiry column; the two
/// are always written and cleared together in a single statement.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub kind: IdentityKind,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // absent for pure social-login accounts
    pub is_verified: bool,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    pub reset_token_expires_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<OffsetDateTime>,
    pub last_login_at: Option<OffsetDateTime>,
    pub auth_provider: Option<String>,
    pub provider_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Public part of an identity returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct PublicIdentity {
    pub id: Uuid,
    pub kind: IdentityKind,
    pub name: String,
    pub email: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
}

impl From<&Identity> for PublicIdentity {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            kind: identity.kind,
            name: identity.name.clone(),
            email: identity.email.clone(),
            is_verified: identity.is_verified,
            is_active: identity.is_active,
            created_at: identity.created_at,
        }
    }
}
