use serde::{Deserialize, Serialize};

use crate::identity::{IdentityKind, PublicIdentity};

/// Request body for registration. `identity_class` selects which of the two
/// identity namespaces the account lands in.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub identity_class: IdentityKind,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for email verification.
#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Request body for requesting a password reset.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Request body for completing a password reset.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for social login.
#[derive(Debug, Deserialize)]
pub struct SocialLoginRequest {
    pub provider: String,
    pub provider_id: String,
    pub email: String,
    pub name: String,
}

/// Response returned after register and login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub session_token: String,
    pub refresh_token: String,
    pub identity: PublicIdentity,
}

/// Response returned after a refresh exchange.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub session_token: String,
}

/// Response returned after social login.
#[derive(Debug, Serialize)]
pub struct SocialLoginResponse {
    pub identity: PublicIdentity,
}

/// Generic message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// The one and only reply `forgot-password` ever produces. Constant text on
/// every branch so the endpoint cannot be used to probe which emails exist.
pub const RESET_REQUESTED_MESSAGE: &str =
    "If this email exists, a password reset link has been sent.";
