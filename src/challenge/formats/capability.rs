//! Capability URL: `base?challenge=<c>&id=<id>&sig=<hex>`.
//!
//! The signature covers the exact URL string that precedes `&sig=`. Values are
//! form-urlencoded, so no value can smuggle in a second `id` pair.

use url::Url;

use crate::credentials::{sign_url, verify_url_signature, TokenInvalid, UrlSigningKey};

const SIG_SEPARATOR: &str = "&sig=";

#[must_use]
pub fn issue(base: &Url, challenge: &str, subject: &str, key: &UrlSigningKey) -> String {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut()
        .append_pair("challenge", challenge)
        .append_pair("id", subject);

    let unsigned = url.to_string();
    let signature = sign_url(&unsigned, key);
    format!("{unsigned}{SIG_SEPARATOR}{signature}")
}

/// Check the signature and return `(challenge, subject)`.
///
/// # Errors
/// `Malformed` if the URL or its parameters are unusable, `BadSignature` if
/// the MAC does not match.
pub fn verify(url: &str, key: &UrlSigningKey) -> Result<(String, String), TokenInvalid> {
    let (unsigned, signature) = url
        .rsplit_once(SIG_SEPARATOR)
        .ok_or(TokenInvalid::Malformed)?;
    if !verify_url_signature(unsigned, signature, key) {
        return Err(TokenInvalid::BadSignature);
    }

    let parsed = Url::parse(unsigned).map_err(|_| TokenInvalid::Malformed)?;
    let mut challenge = None;
    let mut subject = None;
    for (name, value) in parsed.query_pairs() {
        let slot = match name.as_ref() {
            "challenge" => &mut challenge,
            "id" => &mut subject,
            _ => continue,
        };
        if slot.replace(value.into_owned()).is_some() {
            return Err(TokenInvalid::Malformed);
        }
    }

    match (challenge, subject) {
        (Some(challenge), Some(subject)) if !challenge.is_empty() && !subject.is_empty() => {
            Ok((challenge, subject))
        }
        _ => Err(TokenInvalid::Malformed),
    }
}
