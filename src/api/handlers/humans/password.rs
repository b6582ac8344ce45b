use axum::{extract::Extension, response::IntoResponse, Json};
use secrecy::SecretString;
use tracing::instrument;

use super::types::PasswordRequest;
use crate::api::handlers::{error_response, missing_payload};
use crate::challenge::ChallengeEngine;
use crate::identity::IdentityView;

/// Set a new password for an identity. Sending the current password leaves
/// the stored hash untouched.
#[utoipa::path(
    put,
    path= "/humans/password",
    request_body = PasswordRequest,
    responses (
        (status = 200, description = "Password set", body = IdentityView),
        (status = 400, description = "Missing payload or unusable password", body = String),
        (status = 404, description = "Unknown identity", body = String),
    ),
    security(("bearer" = ["idp:update:humans:password"])),
    tag= "humans"
)]
#[instrument(skip(engine, payload))]
pub async fn change_password(
    engine: Extension<ChallengeEngine>,
    payload: Option<Json<PasswordRequest>>,
) -> impl IntoResponse {
    let request: PasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    match engine
        .change_password(&request.id, &SecretString::from(request.password))
        .await
    {
        Ok(identity) => Json(identity.public_view()).into_response(),
        Err(err) => error_response(&err),
    }
}
