pub(crate) mod health;
pub(crate) mod humans;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::challenge::{ChallengeError, IssuedChallenge, VerifiedChallenge};
use crate::mail::Mailer;

/// Outcome of a challenge verification.
///
/// Rejections are a regular `200` answer with `verified: false`; the reason
/// is never disclosed.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct VerificationResponse {
    pub id: String,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

pub(crate) fn missing_payload() -> Response {
    (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response()
}

/// Map an engine error that is not a verification outcome.
pub(crate) fn error_response(err: &ChallengeError) -> Response {
    match err {
        ChallengeError::InvalidInput(reason) => {
            (StatusCode::BAD_REQUEST, (*reason).to_string()).into_response()
        }
        ChallengeError::Store(store) if store.is_not_found() => {
            (StatusCode::NOT_FOUND, "Not found".to_string()).into_response()
        }
        ChallengeError::Store(crate::identity::StoreError::Conflict) => {
            (StatusCode::CONFLICT, "Already exists".to_string()).into_response()
        }
        _ => {
            error!("Request failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.client_message().to_string(),
            )
                .into_response()
        }
    }
}

pub(crate) fn verification_response(result: Result<VerifiedChallenge, ChallengeError>) -> Response {
    match result {
        Ok(verified) => {
            let redirect_to = match &verified {
                VerifiedChallenge::Recovered { redirect_to, .. } => Some(redirect_to.clone()),
                _ => None,
            };
            Json(VerificationResponse {
                id: verified.subject().to_string(),
                verified: true,
                redirect_to,
            })
            .into_response()
        }
        Err(err) if err.is_rejection() => Json(VerificationResponse::default()).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Mail the code of a freshly issued challenge. Failures are logged.
pub(crate) async fn deliver(mailer: &Mailer, issued: &IssuedChallenge) -> bool {
    match mailer.dispatch(issued).await {
        Ok(_) => true,
        Err(err) => {
            error!("Failed to send {} mail: {err:#}", issued.kind);
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::TokenInvalid;
    use crate::identity::StoreError;

    #[test]
    fn error_statuses() {
        assert_eq!(
            error_response(&ChallengeError::InvalidInput("bad")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_response(&ChallengeError::Store(StoreError::NotFound)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_response(&ChallengeError::Store(StoreError::Conflict)).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_response(&ChallengeError::Store(StoreError::Decode("x".to_string()))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rejections_are_ok_with_verified_false() {
        let response =
            verification_response(Err(ChallengeError::Invalid(TokenInvalid::Expired)));
        assert_eq!(response.status(), StatusCode::OK);
        let response = verification_response(Err(ChallengeError::Denied));
        assert_eq!(response.status(), StatusCode::OK);
    }
}
