use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::SecretString;
use tracing::{error, instrument};

use super::types::{AuthenticateRequest, PasscodeRequest, RejectRequest};
use crate::api::handlers::missing_payload;
use crate::authority::{self, AuthenticateResponse, AuthorizationBridge, BridgeError};

fn bridge_response(result: Result<AuthenticateResponse, BridgeError>) -> axum::response::Response {
    match result {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            error!("Login decision failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    post,
    path= "/humans/authenticate",
    request_body = AuthenticateRequest,
    responses (
        (status = 200, description = "Login decision; `authenticated` tells the outcome", body = AuthenticateResponse),
        (status = 400, description = "Missing payload or login challenge", body = String),
        (status = 500, description = "Authority or store failure", body = String),
    ),
    security(("bearer" = ["idp:create:humans:authenticate"])),
    tag= "humans"
)]
#[instrument(skip(bridge, payload))]
pub async fn authenticate(
    bridge: Extension<AuthorizationBridge>,
    payload: Option<Json<AuthenticateRequest>>,
) -> impl IntoResponse {
    let request: AuthenticateRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    if request.challenge.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing challenge".to_string()).into_response();
    }

    bridge_response(
        bridge
            .authenticate(authority::AuthenticateRequest {
                challenge: request.challenge,
                id: request.id,
                password: SecretString::from(request.password),
            })
            .await,
    )
}

#[utoipa::path(
    post,
    path= "/humans/passcode",
    request_body = PasscodeRequest,
    responses (
        (status = 200, description = "Second factor decision", body = AuthenticateResponse),
        (status = 400, description = "Missing payload", body = String),
    ),
    security(("bearer" = ["idp:create:humans:passcode"])),
    tag= "humans"
)]
#[instrument(skip(bridge, payload))]
pub async fn passcode(
    bridge: Extension<AuthorizationBridge>,
    payload: Option<Json<PasscodeRequest>>,
) -> impl IntoResponse {
    let request: PasscodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    bridge_response(bridge.verify_passcode(request.url, request.passcode).await)
}

#[utoipa::path(
    post,
    path= "/humans/reject",
    request_body = RejectRequest,
    responses (
        (status = 200, description = "Login rejected at the authority", body = AuthenticateResponse),
        (status = 400, description = "Missing payload or login challenge", body = String),
    ),
    security(("bearer" = ["idp:create:humans:reject"])),
    tag= "humans"
)]
#[instrument(skip(bridge, payload))]
pub async fn reject(
    bridge: Extension<AuthorizationBridge>,
    payload: Option<Json<RejectRequest>>,
) -> impl IntoResponse {
    let request: RejectRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    if request.challenge.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing challenge".to_string()).into_response();
    }

    let reason = if request.reason.trim().is_empty() {
        "The user denied the login"
    } else {
        request.reason.trim()
    };
    bridge_response(bridge.reject(&request.challenge, reason).await)
}
