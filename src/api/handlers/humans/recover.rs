use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::types::{RecoverCompletionRequest, RecoverRequest, RecoverVerificationRequest};
use crate::api::handlers::{
    deliver, error_response, missing_payload, verification_response, VerificationResponse,
};
use crate::challenge::{ChallengeEngine, ChallengeError, ChallengeIntent, PresentedChallenge};
use crate::mail::Mailer;

/// Always `202` for a well formed request, whether or not the identity
/// exists.
#[utoipa::path(
    post,
    path= "/humans/recover",
    request_body = RecoverRequest,
    responses (
        (status = 202, description = "Recover challenge mailed if the identity exists", body = String),
        (status = 400, description = "Missing payload", body = String),
    ),
    security(("bearer" = ["idp:create:humans:recover"])),
    tag= "humans"
)]
#[instrument(skip(engine, mailer, payload))]
pub async fn issue_recover(
    engine: Extension<ChallengeEngine>,
    mailer: Extension<Arc<Mailer>>,
    payload: Option<Json<RecoverRequest>>,
) -> impl IntoResponse {
    let request: RecoverRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let accepted = (StatusCode::ACCEPTED, "Recover challenge sent".to_string()).into_response();

    match engine
        .issue_challenge(ChallengeIntent::Recover {
            subject: request.id.trim().to_string(),
        })
        .await
    {
        Ok(issued) => {
            deliver(&mailer, &issued).await;
            accepted
        }
        Err(ChallengeError::Store(err)) if err.is_not_found() => {
            debug!("recover requested for unknown identity");
            accepted
        }
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    put,
    path= "/humans/recoververification",
    request_body = RecoverVerificationRequest,
    responses (
        (status = 200, description = "Verification outcome; on success `redirect_to` carries the completion blob", body = VerificationResponse),
        (status = 400, description = "Missing payload or unusable password", body = String),
    ),
    security(("bearer" = ["idp:update:humans:recoververification"])),
    tag= "humans"
)]
#[instrument(skip(engine, payload))]
pub async fn verify_recover(
    engine: Extension<ChallengeEngine>,
    payload: Option<Json<RecoverVerificationRequest>>,
) -> impl IntoResponse {
    let request: RecoverVerificationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    verification_response(
        engine
            .verify_challenge(PresentedChallenge::Recover {
                token: request.recover_challenge,
                code: request.code,
                new_password: SecretString::from(request.password),
            })
            .await,
    )
}

#[utoipa::path(
    put,
    path= "/humans/recovercompletion",
    request_body = RecoverCompletionRequest,
    responses (
        (status = 200, description = "Password rotated when `verified` is true", body = VerificationResponse),
        (status = 400, description = "Missing payload", body = String),
    ),
    security(("bearer" = ["idp:update:humans:recovercompletion"])),
    tag= "humans"
)]
#[instrument(skip(engine, payload))]
pub async fn complete_recover(
    engine: Extension<ChallengeEngine>,
    payload: Option<Json<RecoverCompletionRequest>>,
) -> impl IntoResponse {
    let request: RecoverCompletionRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    verification_response(
        engine
            .verify_challenge(PresentedChallenge::RecoverCompletion {
                blob: request.recover_completion,
            })
            .await,
    )
}
