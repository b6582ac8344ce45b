use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use tracing::{debug, error, instrument};

use super::types::UpdateTotpRequest;
use crate::api::bulk::{self, BulkLimit, BulkResponse};
use crate::api::handlers::missing_payload;
use crate::challenge::{ChallengeEngine, ChallengeError};
use crate::identity::IdentityView;

/// Bulk TOTP update. Each item is isolated: a missing identity or a bad
/// secret only fails that item.
#[utoipa::path(
    put,
    path= "/humans/totp",
    request_body = [UpdateTotpRequest],
    responses (
        (status = 200, description = "One entry per request item", body = [BulkResponse<IdentityView>]),
        (status = 400, description = "Missing payload", body = String),
        (status = 413, description = "Too many items", body = String),
    ),
    security(("bearer" = ["idp:update:humans:totp"])),
    tag= "humans"
)]
#[instrument(skip(engine, limit, payload))]
pub async fn update_totp(
    engine: Extension<ChallengeEngine>,
    limit: Extension<BulkLimit>,
    payload: Option<Json<Vec<UpdateTotpRequest>>>,
) -> impl IntoResponse {
    let requests: Vec<UpdateTotpRequest> = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let engine = &engine.0;
    let result = bulk::handle(requests, *limit, |index, request| async move {
        match engine
            .update_totp(
                &request.id,
                request.totp_secret.as_deref(),
                request.totp_required,
            )
            .await
        {
            Ok(identity) => {
                debug!(id = %identity.id, "TOTP updated");
                BulkResponse::ok(index, identity.public_view())
            }
            Err(ChallengeError::Store(err)) if err.is_not_found() => {
                BulkResponse::client_error(index, StatusCode::NOT_FOUND, "Human not found")
            }
            Err(ChallengeError::InvalidInput(reason)) => {
                BulkResponse::client_error(index, StatusCode::BAD_REQUEST, reason)
            }
            Err(err) => {
                error!("TOTP update failed: {err}");
                BulkResponse::internal_error(index)
            }
        }
    })
    .await;

    match result {
        Ok(responses) => Json(responses).into_response(),
        Err(rejection) => rejection.into_response(),
    }
}
