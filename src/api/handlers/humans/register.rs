use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::SecretString;
use tracing::instrument;

use super::types::RegisterRequest;
use crate::api::handlers::{error_response, missing_payload};
use crate::challenge::{ChallengeEngine, NewIdentity};
use crate::identity::IdentityView;

#[utoipa::path(
    post,
    path= "/humans",
    request_body = RegisterRequest,
    responses (
        (status = 201, description = "Identity created", body = IdentityView, content_type = "application/json"),
        (status = 400, description = "Invalid email or password", body = String),
        (status = 409, description = "Email address already registered", body = String),
    ),
    security(("bearer" = ["idp:create:humans"])),
    tag= "humans"
)]
#[instrument(skip(engine, payload))]
pub async fn register(
    engine: Extension<ChallengeEngine>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let new = NewIdentity {
        name: request.name,
        email: request.email,
        password: SecretString::from(request.password),
    };

    match engine.register(new).await {
        Ok(identity) => (StatusCode::CREATED, Json(identity.public_view())).into_response(),
        Err(err) => error_response(&err),
    }
}
