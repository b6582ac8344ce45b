//! Request/response types for `/humans` endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthenticateRequest {
    /// Login challenge handed out by the authority.
    pub challenge: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasscodeRequest {
    /// Capability URL returned by `/humans/authenticate`.
    pub url: String,
    pub passcode: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RejectRequest {
    pub challenge: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordRequest {
    pub id: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateTotpRequest {
    pub id: String,
    pub totp_required: bool,
    #[serde(default)]
    pub totp_secret: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoverRequest {
    /// Subject id or email address.
    pub id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoverVerificationRequest {
    pub recover_challenge: String,
    pub code: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoverCompletionRequest {
    pub recover_completion: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeleteRequest {
    pub id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeleteVerificationRequest {
    pub id: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailConfirmRequest {
    pub id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailChangeRequest {
    pub id: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailVerificationRequest {
    pub email_challenge: String,
    pub code: String,
}

/// Returned when a mailed challenge was issued.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct IssuedResponse {
    pub id: String,
    pub expires_at: Option<i64>,
}
