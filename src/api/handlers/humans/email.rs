use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::instrument;

use super::types::{
    EmailChangeRequest, EmailConfirmRequest, EmailVerificationRequest, IssuedResponse,
};
use crate::api::handlers::{
    deliver, error_response, missing_payload, verification_response, VerificationResponse,
};
use crate::challenge::{ChallengeEngine, ChallengeIntent, PresentedChallenge};
use crate::mail::Mailer;

async fn issue(
    engine: &ChallengeEngine,
    mailer: &Mailer,
    intent: ChallengeIntent,
) -> axum::response::Response {
    let issued = match engine.issue_challenge(intent).await {
        Ok(issued) => issued,
        Err(err) => return error_response(&err),
    };

    if !deliver(mailer, &issued).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to send confirmation mail".to_string(),
        )
            .into_response();
    }

    (
        StatusCode::ACCEPTED,
        Json(IssuedResponse {
            id: issued.subject,
            expires_at: issued.expires_at,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path= "/humans/emailconfirm",
    request_body = EmailConfirmRequest,
    responses (
        (status = 202, description = "Confirmation code mailed to the current address", body = IssuedResponse),
        (status = 404, description = "Unknown identity", body = String),
    ),
    security(("bearer" = ["idp:create:humans:emailconfirm"])),
    tag= "humans"
)]
#[instrument(skip(engine, mailer, payload))]
pub async fn issue_email_confirm(
    engine: Extension<ChallengeEngine>,
    mailer: Extension<Arc<Mailer>>,
    payload: Option<Json<EmailConfirmRequest>>,
) -> impl IntoResponse {
    let request: EmailConfirmRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    issue(
        &engine,
        &mailer,
        ChallengeIntent::EmailConfirm {
            subject: request.id,
        },
    )
    .await
}

#[utoipa::path(
    put,
    path= "/humans/emailconfirm",
    request_body = EmailVerificationRequest,
    responses (
        (status = 200, description = "Address confirmed when `verified` is true", body = VerificationResponse),
        (status = 400, description = "Missing payload", body = String),
    ),
    security(("bearer" = ["idp:update:humans:emailconfirm"])),
    tag= "humans"
)]
#[instrument(skip(engine, payload))]
pub async fn verify_email_confirm(
    engine: Extension<ChallengeEngine>,
    payload: Option<Json<EmailVerificationRequest>>,
) -> impl IntoResponse {
    let request: EmailVerificationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    verification_response(
        engine
            .verify_challenge(PresentedChallenge::EmailConfirm {
                token: request.email_challenge,
                code: request.code,
            })
            .await,
    )
}

#[utoipa::path(
    post,
    path= "/humans/emailchange",
    request_body = EmailChangeRequest,
    responses (
        (status = 202, description = "Confirmation code mailed to the new address", body = IssuedResponse),
        (status = 400, description = "Invalid email address", body = String),
        (status = 404, description = "Unknown identity", body = String),
    ),
    security(("bearer" = ["idp:create:humans:emailchange"])),
    tag= "humans"
)]
#[instrument(skip(engine, mailer, payload))]
pub async fn issue_email_change(
    engine: Extension<ChallengeEngine>,
    mailer: Extension<Arc<Mailer>>,
    payload: Option<Json<EmailChangeRequest>>,
) -> impl IntoResponse {
    let request: EmailChangeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    issue(
        &engine,
        &mailer,
        ChallengeIntent::EmailChange {
            subject: request.id,
            new_email: request.email,
        },
    )
    .await
}

#[utoipa::path(
    put,
    path= "/humans/emailchange",
    request_body = EmailVerificationRequest,
    responses (
        (status = 200, description = "New address committed when `verified` is true", body = VerificationResponse),
        (status = 400, description = "Missing payload or address already in use", body = String),
    ),
    security(("bearer" = ["idp:update:humans:emailchange"])),
    tag= "humans"
)]
#[instrument(skip(engine, payload))]
pub async fn verify_email_change(
    engine: Extension<ChallengeEngine>,
    payload: Option<Json<EmailVerificationRequest>>,
) -> impl IntoResponse {
    let request: EmailVerificationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    verification_response(
        engine
            .verify_challenge(PresentedChallenge::EmailChange {
                token: request.email_challenge,
                code: request.code,
            })
            .await,
    )
}
