use super::handlers::{health, humans};
use utoipa::openapi::{
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Components, Contact, InfoBuilder, License, OpenApiBuilder, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Handlers sharing a path go into the same `routes!` call.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(humans::register::register, humans::delete::issue_delete))
        .routes(routes!(humans::authenticate::authenticate))
        .routes(routes!(humans::authenticate::passcode))
        .routes(routes!(humans::authenticate::reject))
        .routes(routes!(humans::password::change_password))
        .routes(routes!(humans::totp::update_totp))
        .routes(routes!(humans::recover::issue_recover))
        .routes(routes!(humans::recover::verify_recover))
        .routes(routes!(humans::recover::complete_recover))
        .routes(routes!(humans::delete::verify_delete))
        .routes(routes!(
            humans::email::issue_email_confirm,
            humans::email::verify_email_confirm
        ))
        .routes(routes!(
            humans::email::issue_email_change,
            humans::email::verify_email_change
        ));

    let mut humans_tag = Tag::new("humans");
    humans_tag.description = Some("Identities, login and challenges".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service health".to_string());

    // utoipa-axum 0.1 (axum 0.7) has no `get_openapi_mut`; take the document out
    // and merge the routes back into it (merging the emptied document is a no-op).
    let mut openapi = router.to_openapi();
    openapi.tags = Some(vec![humans_tag, health_tag]);
    openapi
        .components
        .get_or_insert_with(Components::new)
        .add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );

    OpenApiRouter::with_openapi(openapi).merge(router)
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    author.find('<').map_or_else(
        || {
            let name = author.trim();
            ((!name.is_empty()).then_some(name), None)
        },
        |start| {
            let name = author[..start].trim();
            let email = author[start + 1..].trim_end_matches('>').trim();
            (
                (!name.is_empty()).then_some(name),
                (!email.is_empty()).then_some(email),
            )
        },
    )
}
