//! Bearer token authorization for API routes.
//!
//! Every route except `/health` requires one scope, named
//! `idp:<verb>:<resource>`. The presented access token is introspected at the
//! login authority; the request only reaches its handler when the token is
//! active and grants the route's scope.

use axum::{
    extract::{MatchedPath, Request, State},
    http::{header::AUTHORIZATION, header::WWW_AUTHENTICATE, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::authority::TokenIntrospector;

/// `(method, path, scope)` for every protected route.
pub const ROUTE_SCOPES: &[(&str, &str, &str)] = &[
    ("POST", "/humans", "idp:create:humans"),
    ("DELETE", "/humans", "idp:delete:humans"),
    ("POST", "/humans/authenticate", "idp:create:humans:authenticate"),
    ("POST", "/humans/passcode", "idp:create:humans:passcode"),
    ("POST", "/humans/reject", "idp:create:humans:reject"),
    ("PUT", "/humans/password", "idp:update:humans:password"),
    ("PUT", "/humans/totp", "idp:update:humans:totp"),
    ("POST", "/humans/recover", "idp:create:humans:recover"),
    ("PUT", "/humans/recoververification", "idp:update:humans:recoververification"),
    ("PUT", "/humans/recovercompletion", "idp:update:humans:recovercompletion"),
    ("PUT", "/humans/deleteverification", "idp:update:humans:deleteverification"),
    ("POST", "/humans/emailconfirm", "idp:create:humans:emailconfirm"),
    ("PUT", "/humans/emailconfirm", "idp:update:humans:emailconfirm"),
    ("POST", "/humans/emailchange", "idp:create:humans:emailchange"),
    ("PUT", "/humans/emailchange", "idp:update:humans:emailchange"),
];

const PUBLIC_PATHS: &[&str] = &["/health"];

/// The authorized caller, available to handlers as a request extension.
#[derive(Clone, Debug)]
pub struct Principal {
    pub subject: String,
    pub client_id: String,
    pub scope: &'static str,
}

#[derive(Debug, PartialEq, Eq)]
enum Access {
    Public,
    Scope(&'static str),
    Unknown,
}

fn route_access(method: &Method, path: &str) -> Access {
    if PUBLIC_PATHS.contains(&path) {
        return Access::Public;
    }
    ROUTE_SCOPES
        .iter()
        .find(|(m, p, _)| *m == method.as_str() && *p == path)
        .map_or(Access::Unknown, |&(_, _, scope)| Access::Scope(scope))
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, "Bearer")],
        "Unauthorized".to_string(),
    )
        .into_response()
}

/// Reject the request unless its bearer token grants the route's scope.
///
/// Routes not listed in [`ROUTE_SCOPES`] are passed through only when they
/// are public; anything else is forbidden.
pub async fn require_scope(
    State(introspector): State<Arc<dyn TokenIntrospector>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str)
        .to_string();

    let scope = match route_access(request.method(), &path) {
        Access::Public => return next.run(request).await,
        Access::Scope(scope) => scope,
        Access::Unknown => {
            debug!(method = %request.method(), path = %path, "no scope for route");
            return (StatusCode::FORBIDDEN, "Forbidden".to_string()).into_response();
        }
    };

    let Some(token) = bearer_token(&request) else {
        return unauthorized();
    };

    let introspection = match introspector.introspect(token).await {
        Ok(introspection) => introspection,
        Err(err) => {
            error!("Token introspection failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
                .into_response();
        }
    };

    if !introspection.active {
        return unauthorized();
    }
    if !introspection.grants(scope) {
        debug!(client_id = %introspection.client_id, scope, "scope not granted");
        return (StatusCode::FORBIDDEN, "Forbidden".to_string()).into_response();
    }

    request.extensions_mut().insert(Principal {
        subject: introspection.sub,
        client_id: introspection.client_id,
        scope,
    });
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_resolve_to_their_scope() {
        assert_eq!(route_access(&Method::GET, "/health"), Access::Public);
        assert_eq!(
            route_access(&Method::PUT, "/humans/totp"),
            Access::Scope("idp:update:humans:totp")
        );
        assert_eq!(
            route_access(&Method::DELETE, "/humans"),
            Access::Scope("idp:delete:humans")
        );
        assert_eq!(route_access(&Method::GET, "/humans"), Access::Unknown);
    }

    #[test]
    fn scopes_are_unique_and_namespaced() {
        let mut scopes: Vec<_> = ROUTE_SCOPES.iter().map(|(_, _, scope)| *scope).collect();
        assert!(scopes.iter().all(|scope| scope.starts_with("idp:")));
        scopes.sort_unstable();
        scopes.dedup();
        assert_eq!(scopes.len(), ROUTE_SCOPES.len());
    }
}
