//! Bulk request envelope.
//!
//! A bulk endpoint takes a JSON array and answers with one entry per item.
//! Items are handled one at a time and a failing item never changes the
//! outcome of another.

use axum::http::StatusCode;
use serde::Serialize;
use std::future::Future;
use utoipa::ToSchema;

pub const DEFAULT_MAX_REQUESTS: usize = 1;

/// Maximum number of items a single bulk request may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkLimit(pub usize);

impl Default for BulkLimit {
    fn default() -> Self {
        Self(DEFAULT_MAX_REQUESTS)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct BulkError {
    pub code: u16,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct BulkResponse<T> {
    pub index: usize,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BulkError>,
}

impl<T> BulkResponse<T> {
    #[must_use]
    pub const fn ok(index: usize, value: T) -> Self {
        Self {
            index,
            status: 200,
            ok: Some(value),
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn client_error(index: usize, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            index,
            status: status.as_u16(),
            ok: None,
            errors: vec![BulkError {
                code: status.as_u16(),
                error: message.into(),
            }],
        }
    }

    #[must_use]
    pub fn internal_error(index: usize) -> Self {
        Self::client_error(index, StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

/// Run `handle` for each item, in order.
///
/// # Errors
/// `PAYLOAD_TOO_LARGE` when there are more items than `limit` allows and
/// `BAD_REQUEST` for an empty batch. No item is processed in either case.
pub async fn handle<I, T, F, Fut>(
    items: Vec<I>,
    limit: BulkLimit,
    mut handler: F,
) -> Result<Vec<BulkResponse<T>>, (StatusCode, String)>
where
    F: FnMut(usize, I) -> Fut,
    Fut: Future<Output = BulkResponse<T>>,
{
    if items.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Empty request".to_string()));
    }
    if items.len() > limit.0 {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("At most {} requests allowed", limit.0),
        ));
    }

    let mut responses = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        responses.push(handler(index, item).await);
    }
    Ok(responses)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn each_item_gets_its_own_outcome() {
        let responses = handle(vec![1, -1, 3], BulkLimit(3), |index, item: i32| async move {
            if item < 0 {
                BulkResponse::client_error(index, StatusCode::NOT_FOUND, "negative")
            } else {
                BulkResponse::ok(index, item * 2)
            }
        })
        .await
        .unwrap();

        assert_eq!(responses[0], BulkResponse::ok(0, 2));
        assert_eq!(responses[1].status, 404);
        assert_eq!(responses[1].ok, None);
        assert_eq!(responses[2], BulkResponse::ok(2, 6));
    }

    #[tokio::test]
    async fn oversized_batch_is_refused_whole() {
        let mut calls = 0;
        let result = handle(vec![1, 2], BulkLimit::default(), |index, item: i32| {
            calls += 1;
            async move { BulkResponse::ok(index, item) }
        })
        .await;
        assert_eq!(result.unwrap_err().0, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(calls, 0);
    }

    #[test]
    fn envelope_shape() {
        let ok = serde_json::to_value(BulkResponse::ok(0, "x")).unwrap();
        assert_eq!(ok, serde_json::json!({"index": 0, "status": 200, "ok": "x"}));
        let err = serde_json::to_value(BulkResponse::<()>::internal_error(1)).unwrap();
        assert_eq!(
            err,
            serde_json::json!({
                "index": 1,
                "status": 500,
                "errors": [{"code": 500, "error": "internal error"}]
            })
        );
    }
}
