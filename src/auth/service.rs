use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use time::Duration;
use tracing::{info, warn};

use crate::auth::dto::{
    AuthResponse, LoginRequest, MessageResponse, RefreshResponse, RegisterRequest,
    SocialLoginRequest, SocialLoginResponse, RESET_REQUESTED_MESSAGE,
};
use crate::auth::error::AuthError;
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::tokens;
use crate::identity::{Identity, IdentityKind, IdentityStore, NewIdentity, PublicIdentity};
use crate::state::AppState;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_email(email: &str) -> Result<(), AuthError> {
    if !is_valid_email(email) {
        return Err(AuthError::Validation("invalid email".into()));
    }
    Ok(())
}

fn check_password_strength(password: &str) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::Validation("password too short".into()));
    }
    Ok(())
}

/// Issues an opaque refresh token, persists the pair on the record and signs
/// a session artifact. Shared tail of register and login.
async fn open_session(state: &AppState, identity: &Identity) -> Result<AuthResponse, AuthError> {
    let refresh = tokens::issue_refresh_token(Duration::days(state.config.tokens.refresh_ttl_days));
    state
        .store
        .set_refresh_token(identity.id, &refresh.token, refresh.expires_at)
        .await?;

    let keys = JwtKeys::from_ref(state);
    let session_token = keys.sign_session(identity)?;
    Ok(AuthResponse {
        session_token,
        refresh_token: refresh.token,
        identity: PublicIdentity::from(identity),
    })
}

pub async fn register(state: &AppState, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
    let email = normalize_email(&req.email);
    check_email(&email)?;
    check_password_strength(&req.password)?;
    if req.password != req.confirm_password {
        return Err(AuthError::Validation("passwords do not match".into()));
    }
    if req.name.trim().is_empty() {
        return Err(AuthError::Validation("name must not be empty".into()));
    }

    // Existence in the other identity class is not a conflict; the store's
    // per-kind unique index is the final arbiter under concurrent requests.
    if state
        .store
        .find_by_email(req.identity_class, &email)
        .await?
        .is_some()
    {
        warn!(kind = req.identity_class.as_str(), "registration email already taken");
        return Err(AuthError::Conflict);
    }

    let password_hash = hash_password(&req.password)?;
    let verification = tokens::issue_verification_token(Duration::hours(
        state.config.tokens.verification_ttl_hours,
    ));

    let identity = state
        .store
        .create(NewIdentity {
            kind: req.identity_class,
            name: req.name.trim().to_owned(),
            email,
            password_hash: Some(password_hash),
            is_verified: false,
            verification_token: Some(verification.token),
            verification_expires_at: Some(verification.expires_at),
            auth_provider: None,
            provider_id: None,
        })
        .await?;

    info!(identity_id = %identity.id, kind = identity.kind.as_str(), "identity registered");
    // Soft gate: the session is usable right away, the account stays
    // flagged unverified until the emailed token comes back.
    open_session(state, &identity).await
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse, AuthError> {
    let email = normalize_email(&req.email);
    check_email(&email)?;

    // Absent account and wrong password fall through to the same error so
    // the endpoint cannot be used to enumerate accounts.
    let identity = state
        .store
        .find_by_email_any(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let hash = identity
        .password_hash
        .as_deref()
        .ok_or(AuthError::InvalidCredentials)?;
    if !verify_password(&req.password, hash)? {
        warn!(identity_id = %identity.id, "login with wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    state.store.touch_last_login(identity.id).await?;

    info!(identity_id = %identity.id, kind = identity.kind.as_str(), "identity logged in");
    open_session(state, &identity).await
}

pub async fn verify_email(state: &AppState, token: &str) -> Result<MessageResponse, AuthError> {
    let identity = state
        .store
        .find_by_verification_token(token)
        .await?
        .ok_or(AuthError::InvalidToken("invalid verification token"))?;

    let check = tokens::validate(
        identity.verification_token.as_deref(),
        identity.verification_expires_at,
    );
    if !check.is_valid {
        warn!(identity_id = %identity.id, "verification token rejected");
        return Err(AuthError::InvalidToken(
            check.reason.unwrap_or("invalid verification token"),
        ));
    }

    state.store.mark_verified(identity.id).await?;
    info!(identity_id = %identity.id, "email verified");
    Ok(MessageResponse {
        message: "Email verified successfully.".into(),
    })
}

pub async fn request_reset(state: &AppState, email: &str) -> Result<MessageResponse, AuthError> {
    let email = normalize_email(email);

    if let Some(identity) = state.store.find_by_email_any(&email).await? {
        let reset =
            tokens::issue_reset_token(Duration::minutes(state.config.tokens.reset_ttl_minutes));
        state
            .store
            .set_reset_token(identity.id, &reset.token, reset.expires_at)
            .await?;
        info!(identity_id = %identity.id, "password reset requested");
    }

    // Identical reply whether or not the account exists.
    Ok(MessageResponse {
        message: RESET_REQUESTED_MESSAGE.into(),
    })
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    new_password: &str,
) -> Result<MessageResponse, AuthError> {
    check_password_strength(new_password)?;

    let identity = state
        .store
        .find_by_reset_token(token)
        .await?
        .ok_or(AuthError::InvalidToken("invalid reset token"))?;

    let check = tokens::validate(
        identity.password_reset_token.as_deref(),
        identity.reset_token_expires_at,
    );
    if !check.is_valid {
        warn!(identity_id = %identity.id, "reset token rejected");
        return Err(AuthError::InvalidToken(
            check.reason.unwrap_or("invalid reset token"),
        ));
    }

    let password_hash = hash_password(new_password)?;
    state.store.set_password(identity.id, &password_hash).await?;
    info!(identity_id = %identity.id, "password reset completed");
    Ok(MessageResponse {
        message: "Password updated successfully.".into(),
    })
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> Result<RefreshResponse, AuthError> {
    let identity = state
        .store
        .find_by_refresh_token(refresh_token)
        .await?
        .ok_or(AuthError::Unauthorized)?;

    let check = tokens::validate(
        identity.refresh_token.as_deref(),
        identity.refresh_token_expires_at,
    );
    if !check.is_valid {
        warn!(identity_id = %identity.id, "expired refresh token presented");
        return Err(AuthError::Unauthorized);
    }

    // The stored refresh token is deliberately not rotated here; it stays
    // valid until its fixed expiry.
    let keys = JwtKeys::from_ref(state);
    let session_token = keys.sign_session(&identity)?;
    Ok(RefreshResponse { session_token })
}

pub async fn authenticate_social(
    state: &AppState,
    req: SocialLoginRequest,
) -> Result<SocialLoginResponse, AuthError> {
    let email = normalize_email(&req.email);
    check_email(&email)?;

    // Social login is only wired into the standard identity class.
    if let Some(identity) = state
        .store
        .find_by_provider(IdentityKind::Standard, &req.provider, &req.provider_id)
        .await?
    {
        return Ok(SocialLoginResponse {
            identity: PublicIdentity::from(&identity),
        });
    }

    // First social login: trusted by the provider, so verified from the
    // start and without a password hash.
    let identity = state
        .store
        .create(NewIdentity {
            kind: IdentityKind::Standard,
            name: req.name.trim().to_owned(),
            email,
            password_hash: None,
            is_verified: true,
            verification_token: None,
            verification_expires_at: None,
            auth_provider: Some(req.provider),
            provider_id: Some(req.provider_id),
        })
        .await?;

    info!(identity_id = %identity.id, provider = identity.auth_provider.as_deref().unwrap_or(""), "social identity created");
    Ok(SocialLoginResponse {
        identity: PublicIdentity::from(&identity),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::dto::RegisterRequest;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn register_req(email: &str, kind: IdentityKind) -> RegisterRequest {
        RegisterRequest {
            name: "Ana".into(),
            email: email.into(),
            password: "Secret123!".into(),
            confirm_password: "Secret123!".into(),
            identity_class: kind,
        }
    }

    #[tokio::test]
    async fn register_issues_session_and_pending_verification() {
        let state = AppState::fake();
        let response = register(&state, register_req("ana@x.com", IdentityKind::Standard))
            .await
            .expect("register");

        assert!(!response.session_token.is_empty());
        assert!(!response.identity.is_verified);

        let stored = state
            .store
            .find_by_email(IdentityKind::Standard, "ana@x.com")
            .await
            .unwrap()
            .expect("stored identity");
        let token = stored.verification_token.expect("verification token");
        assert_eq!(token.len(), 64);
        let expires = stored.verification_expires_at.expect("verification expiry");
        let window = expires - OffsetDateTime::now_utc();
        assert!(window > Duration::hours(23) && window <= Duration::hours(24));
        // Refresh pair persisted together with its expiry.
        assert!(stored.refresh_token.is_some());
        assert!(stored.refresh_token_expires_at.is_some());
    }

    #[tokio::test]
    async fn register_rejects_password_mismatch() {
        let state = AppState::fake();
        let mut req = register_req("ana@x.com", IdentityKind::Standard);
        req.confirm_password = "Different1!".into();
        let err = register(&state, req).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn register_normalizes_email_case_and_whitespace() {
        let state = AppState::fake();
        let response = register(&state, register_req("  Ana@X.Com ", IdentityKind::Standard))
            .await
            .expect("register");
        assert_eq!(response.identity.email, "ana@x.com");
    }

    #[tokio::test]
    async fn same_email_is_independent_across_kinds_but_unique_within_one() {
        let state = AppState::fake();
        register(&state, register_req("expert@x.com", IdentityKind::Expert))
            .await
            .expect("expert registration");
        register(&state, register_req("expert@x.com", IdentityKind::Standard))
            .await
            .expect("same email as standard must succeed");
        let err = register(&state, register_req("expert@x.com", IdentityKind::Expert))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
    }

    #[tokio::test]
    async fn verify_email_sets_flag_and_clears_pair_once() {
        let state = AppState::fake();
        register(&state, register_req("ana@x.com", IdentityKind::Standard))
            .await
            .unwrap();
        let token = state
            .store
            .find_by_email(IdentityKind::Standard, "ana@x.com")
            .await
            .unwrap()
            .unwrap()
            .verification_token
            .unwrap();

        verify_email(&state, &token).await.expect("first verify");

        let stored = state
            .store
            .find_by_email(IdentityKind::Standard, "ana@x.com")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_verified);
        assert!(stored.verification_token.is_none());
        assert!(stored.verification_expires_at.is_none());

        // The cleared token must never verify a second time.
        let err = verify_email(&state, &token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn verify_email_distinguishes_expired_from_unknown() {
        let state = AppState::fake();
        let err = verify_email(&state, "no-such-token").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken("invalid verification token")));
    }

    #[tokio::test]
    async fn login_error_is_uniform_for_unknown_email_and_wrong_password() {
        let state = AppState::fake();
        register(&state, register_req("ana@x.com", IdentityKind::Standard))
            .await
            .unwrap();

        let unknown = login(
            &state,
            LoginRequest {
                email: "nobody@x.com".into(),
                password: "Secret123!".into(),
            },
        )
        .await
        .unwrap_err();
        let wrong = login(
            &state,
            LoginRequest {
                email: "ana@x.com".into(),
                password: "WrongPass1!".into(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn login_touches_last_login_for_both_kinds() {
        let state = AppState::fake();
        for (email, kind) in [
            ("farmer@x.com", IdentityKind::Standard),
            ("agro@x.com", IdentityKind::Expert),
        ] {
            register(&state, register_req(email, kind)).await.unwrap();
            login(
                &state,
                LoginRequest {
                    email: email.into(),
                    password: "Secret123!".into(),
                },
            )
            .await
            .expect("login");
            let stored = state
                .store
                .find_by_email(kind, email)
                .await
                .unwrap()
                .unwrap();
            assert!(stored.last_login_at.is_some());
        }
    }

    #[tokio::test]
    async fn reset_request_reply_is_byte_identical_either_way() {
        let state = AppState::fake();
        register(&state, register_req("ana@x.com", IdentityKind::Standard))
            .await
            .unwrap();

        let known = request_reset(&state, "ana@x.com").await.unwrap();
        let unknown = request_reset(&state, "nobody@nowhere.com").await.unwrap();
        assert_eq!(known.message, unknown.message);

        // Unknown email leaves no trace.
        assert!(state
            .store
            .find_by_email_any("nobody@nowhere.com")
            .await
            .unwrap()
            .is_none());
        // Known email got a reset pair.
        let stored = state
            .store
            .find_by_email(IdentityKind::Standard, "ana@x.com")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.password_reset_token.is_some());
        assert!(stored.reset_token_expires_at.is_some());
    }

    #[tokio::test]
    async fn reset_password_swaps_hash_and_clears_pair() {
        let state = AppState::fake();
        register(&state, register_req("ana@x.com", IdentityKind::Standard))
            .await
            .unwrap();
        request_reset(&state, "ana@x.com").await.unwrap();
        let token = state
            .store
            .find_by_email(IdentityKind::Standard, "ana@x.com")
            .await
            .unwrap()
            .unwrap()
            .password_reset_token
            .unwrap();

        reset_password(&state, &token, "NewSecret456!")
            .await
            .expect("reset");

        let stored = state
            .store
            .find_by_email(IdentityKind::Standard, "ana@x.com")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.password_reset_token.is_none());
        assert!(stored.reset_token_expires_at.is_none());

        // Old password dead, new one live.
        let old = login(
            &state,
            LoginRequest {
                email: "ana@x.com".into(),
                password: "Secret123!".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(old, AuthError::InvalidCredentials));
        login(
            &state,
            LoginRequest {
                email: "ana@x.com".into(),
                password: "NewSecret456!".into(),
            },
        )
        .await
        .expect("login with new password");
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let state = AppState::fake();
        register(&state, register_req("ana@x.com", IdentityKind::Standard))
            .await
            .unwrap();
        let identity = state
            .store
            .find_by_email(IdentityKind::Standard, "ana@x.com")
            .await
            .unwrap()
            .unwrap();
        let past = OffsetDateTime::now_utc() - Duration::minutes(5);
        state
            .store
            .set_reset_token(identity.id, "stale-token", past)
            .await
            .unwrap();

        let err = reset_password(&state, "stale-token", "NewSecret456!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken("token expired")));
    }

    #[tokio::test]
    async fn newer_reset_request_supersedes_the_old_token() {
        let state = AppState::fake();
        register(&state, register_req("ana@x.com", IdentityKind::Standard))
            .await
            .unwrap();
        request_reset(&state, "ana@x.com").await.unwrap();
        let first = state
            .store
            .find_by_email(IdentityKind::Standard, "ana@x.com")
            .await
            .unwrap()
            .unwrap()
            .password_reset_token
            .unwrap();
        request_reset(&state, "ana@x.com").await.unwrap();

        // Last write wins; the first token no longer matches any record.
        let err = reset_password(&state, &first, "NewSecret456!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn refresh_exchanges_a_live_token_for_a_new_session() {
        let state = AppState::fake();
        let registered = register(&state, register_req("ana@x.com", IdentityKind::Standard))
            .await
            .unwrap();
        let response = refresh(&state, &registered.refresh_token)
            .await
            .expect("refresh");
        assert!(!response.session_token.is_empty());
    }

    #[tokio::test]
    async fn refresh_rejects_unknown_and_expired_tokens() {
        let state = AppState::fake();
        let err = refresh(&state, &Uuid::new_v4().to_string()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));

        register(&state, register_req("ana@x.com", IdentityKind::Standard))
            .await
            .unwrap();
        let identity = state
            .store
            .find_by_email(IdentityKind::Standard, "ana@x.com")
            .await
            .unwrap()
            .unwrap();
        let past = OffsetDateTime::now_utc() - Duration::seconds(1);
        state
            .store
            .set_refresh_token(identity.id, "expired-token", past)
            .await
            .unwrap();
        let err = refresh(&state, "expired-token").await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn social_login_upserts_a_verified_standard_identity() {
        let state = AppState::fake();
        let req = || SocialLoginRequest {
            provider: "google".into(),
            provider_id: "g-123".into(),
            email: "ana@gmail.com".into(),
            name: "Ana".into(),
        };

        let first = authenticate_social(&state, req()).await.expect("create");
        assert!(first.identity.is_verified);
        assert_eq!(first.identity.kind, IdentityKind::Standard);

        let second = authenticate_social(&state, req()).await.expect("lookup");
        assert_eq!(first.identity.id, second.identity.id);

        let stored = state
            .store
            .find_by_provider(IdentityKind::Standard, "google", "g-123")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.password_hash.is_none());
        assert_eq!(stored.auth_provider.as_deref(), Some("google"));
        assert_eq!(stored.provider_id.as_deref(), Some("g-123"));
    }

    #[tokio::test]
    async fn social_account_cannot_password_login() {
        let state = AppState::fake();
        authenticate_social(
            &state,
            SocialLoginRequest {
                provider: "google".into(),
                provider_id: "g-123".into(),
                email: "ana@gmail.com".into(),
                name: "Ana".into(),
            },
        )
        .await
        .unwrap();

        let err = login(
            &state,
            LoginRequest {
                email: "ana@gmail.com".into(),
                password: "whatever123".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
}
