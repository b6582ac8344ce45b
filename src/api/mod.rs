use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware, Extension, Router,
};
use sqlx::PgPool;
use std::{fmt, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    authority::{AuthorizationBridge, TokenIntrospector},
    challenge::ChallengeEngine,
    mail::Mailer,
};

mod auth;
mod bulk;
pub(crate) mod handlers;
mod openapi;

pub use auth::{Principal, ROUTE_SCOPES};
pub use bulk::{BulkError, BulkLimit, BulkResponse};
pub use openapi::openapi;

/// Everything the handlers need, shared through request extensions.
#[derive(Clone)]
pub struct ApiState {
    pub engine: ChallengeEngine,
    pub bridge: AuthorizationBridge,
    pub mailer: Mailer,
    pub bulk_limit: BulkLimit,
    /// Authorizes callers' bearer tokens.
    pub introspector: Arc<dyn TokenIntrospector>,
    /// Pinged by `/health`; `None` for the in-memory store.
    pub database: Option<PgPool>,
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("engine", &self.engine)
            .field("bridge", &self.bridge)
            .field("mailer", &self.mailer)
            .field("bulk_limit", &self.bulk_limit)
            .field("database", &self.database.is_some())
            .finish_non_exhaustive()
    }
}

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// The complete application: documented routes plus request id, tracing and
/// authorization layers.
pub fn app(state: ApiState) -> Router {
    let (router, _openapi) = router().split_for_parts();
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(middleware::from_fn_with_state(
                state.introspector,
                auth::require_scope,
            ))
            .layer(Extension(state.engine))
            .layer(Extension(state.bridge))
            .layer(Extension(Arc::new(state.mailer)))
            .layer(Extension(state.bulk_limit))
            .layer(Extension(state.database)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(port: u16, state: ApiState) -> Result<()> {
    let app = app(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Gracefully shutdown"),
        Err(err) => {
            error!("Failed to listen for shutdown signal: {err}");
            std::future::pending::<()>().await;
        }
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
