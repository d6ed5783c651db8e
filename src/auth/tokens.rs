use rand::rngs::OsRng;
use rand::RngCore;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// A freshly issued token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// 256-bit random token, hex-encoded. Used for verification and reset tokens
/// which travel in links and must be infeasible to guess.
fn random_hex_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn issue_verification_token(window: Duration) -> IssuedToken {
    IssuedToken {
        token: random_hex_token(),
        expires_at: OffsetDateTime::now_utc() + window,
    }
}

pub fn issue_reset_token(window: Duration) -> IssuedToken {
    IssuedToken {
        token: random_hex_token(),
        expires_at: OffsetDateTime::now_utc() + window,
    }
}

/// Refresh tokens are only ever compared by exact match, never decoded, so a
/// random UUID carries enough entropy.
pub fn issue_refresh_token(window: Duration) -> IssuedToken {
    IssuedToken {
        token: Uuid::new_v4().to_string(),
        expires_at: OffsetDateTime::now_utc() + window,
    }
}

/// Outcome of a temporal validity check on an already-located token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCheck {
    pub is_valid: bool,
    pub is_expired: bool,
    pub reason: Option<&'static str>,
}

/// Checks temporal validity of a stored token pair. Matching the supplied
/// token against the stored value is the store's lookup job, not this one;
/// by the time this runs the record has already been found by exact match.
///
/// A cleared pair (either side absent) must never validate.
pub fn validate(token: Option<&str>, expires_at: Option<OffsetDateTime>) -> TokenCheck {
    let expires_at = match (token, expires_at) {
        (Some(t), Some(e)) if !t.is_empty() => e,
        _ => {
            return TokenCheck {
                is_valid: false,
                is_expired: true,
                reason: Some("token missing or already used"),
            }
        }
    };
    if OffsetDateTime::now_utc() > expires_at {
        return TokenCheck {
            is_valid: false,
            is_expired: true,
            reason: Some("token expired"),
        };
    }
    TokenCheck {
        is_valid: true,
        is_expired: false,
        reason: None,
    }
}
