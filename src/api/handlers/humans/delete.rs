use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::instrument;

use super::types::{DeleteRequest, DeleteVerificationRequest, IssuedResponse};
use crate::api::handlers::{
    deliver, error_response, missing_payload, verification_response, VerificationResponse,
};
use crate::challenge::{ChallengeEngine, ChallengeIntent, PresentedChallenge};
use crate::mail::Mailer;

#[utoipa::path(
    delete,
    path= "/humans",
    request_body = DeleteRequest,
    responses (
        (status = 202, description = "Delete code mailed", body = IssuedResponse),
        (status = 404, description = "Unknown identity", body = String),
        (status = 500, description = "Delete code could not be mailed", body = String),
    ),
    security(("bearer" = ["idp:delete:humans"])),
    tag= "humans"
)]
#[instrument(skip(engine, mailer, payload))]
pub async fn issue_delete(
    engine: Extension<ChallengeEngine>,
    mailer: Extension<Arc<Mailer>>,
    payload: Option<Json<DeleteRequest>>,
) -> impl IntoResponse {
    let request: DeleteRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let issued = match engine
        .issue_challenge(ChallengeIntent::Delete {
            subject: request.id,
        })
        .await
    {
        Ok(issued) => issued,
        Err(err) => return error_response(&err),
    };

    if !deliver(&mailer, &issued).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to send delete code".to_string(),
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
    put,
    path= "/humans/deleteverification",
    request_body = DeleteVerificationRequest,
    responses (
        (status = 200, description = "Identity deleted when `verified` is true", body = VerificationResponse),
        (status = 400, description = "Missing payload", body = String),
    ),
    security(("bearer" = ["idp:update:humans:deleteverification"])),
    tag= "humans"
)]
#[instrument(skip(engine, payload))]
pub async fn verify_delete(
    engine: Extension<ChallengeEngine>,
    payload: Option<Json<DeleteVerificationRequest>>,
) -> impl IntoResponse {
    let request: DeleteVerificationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    verification_response(
        engine
            .verify_challenge(PresentedChallenge::Delete {
                subject: request.id,
                code: request.code,
            })
            .await,
    )
}
