use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::auth::dto::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, RefreshRequest,
    RefreshResponse, RegisterRequest, ResetPasswordRequest, SocialLoginRequest,
    SocialLoginResponse, VerifyEmailRequest,
};
use crate::auth::error::AuthError;
use crate::auth::extractors::AuthUser;
use crate::auth::service;
use crate::identity::{IdentityStore, PublicIdentity};
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/refresh", post(refresh))
        .route("/auth/social", post(social_login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let response = service::register(&state, payload).await?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let response = service::login(&state, payload).await?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let response = service::verify_email(&state, &payload.token).await?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let response = service::request_reset(&state, &payload.email).await?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let response = service::reset_password(&state, &payload.token, &payload.new_password).await?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AuthError> {
    let response = service::refresh(&state, &payload.refresh_token).await?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn social_login(
    State(state): State<AppState>,
    Json(payload): Json<SocialLoginRequest>,
) -> Result<Json<SocialLoginResponse>, AuthError> {
    let response = service::authenticate_social(&state, payload).await?;
    Ok(Json(response))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(identity_id): AuthUser,
) -> Result<Json<PublicIdentity>, AuthError> {
    let identity = state
        .store
        .find_by_id(identity_id)
        .await?
        .ok_or(AuthError::Unauthorized)?;
    Ok(Json(PublicIdentity::from(&identity)))
}
