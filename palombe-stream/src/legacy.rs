//! Legacy single-round authentication (jabber:iq:auth, XEP-0078).
//!
//! Used only when the server advertises no mechanism negotiation at all.
//! The digest variant never puts the raw secret on the wire: it sends the
//! hex SHA-1 of the stream id concatenated with the password. Plaintext is
//! a last resort, gated by channel security or explicit policy.

use sha1::{Digest, Sha1};

use palombe_sasl::element::Element;
use palombe_sasl::error::{AuthError, AuthOutcome, FailureReason, PolicyViolation};
use palombe_sasl::types::AttemptContext;

use crate::config::SecurityPolicy;

pub const NS_IQ_AUTH_FEATURE: &str = "http://jabber.org/features/iq-auth";
pub const NS_IQ_AUTH: &str = "jabber:iq:auth";

const IQ_ID: &str = "auth-legacy-1";

pub fn is_offered(features: &Element) -> bool {
    features
        .child("auth")
        .map(|el| el.ns() == Some(NS_IQ_AUTH_FEATURE))
        .unwrap_or(false)
}

/// Builds the single `<iq type='set'>` request. With a stream id available
/// the derived digest is sent; otherwise the raw password is only allowed
/// over a secured channel or under an explicit plaintext policy.
pub fn submit(
    cx: &AttemptContext,
    stream_id: Option<&str>,
    policy: &SecurityPolicy,
    secured: bool,
) -> Result<Element, AuthError> {
    let mut query = Element::new("query")
        .with_attr("xmlns", NS_IQ_AUTH)
        .with_child(Element::new("username").with_text(&cx.credential.identity))
        .with_child(Element::new("resource").with_text(&cx.resource));

    match stream_id {
        Some(sid) => {
            let mut hasher = Sha1::new();
            hasher.update(sid.as_bytes());
            hasher.update(cx.credential.secret());
            let digest = hex::encode(hasher.finalize());
            query = query.with_child(Element::new("digest").with_text(digest));
        }
        None if secured || policy.allow_plaintext_mechanisms => {
            let password = String::from_utf8_lossy(cx.credential.secret()).into_owned();
            query = query.with_child(Element::new("password").with_text(password));
        }
        None => {
            return Err(AuthError::Policy(PolicyViolation::PlaintextLegacyDisallowed));
        }
    }

    Ok(Element::new("iq")
        .with_attr("type", "set")
        .with_attr("id", IQ_ID)
        .with_child(query))
}

pub fn on_result(element: &Element) -> AuthOutcome {
    if element.name != "iq" {
        return AuthOutcome::Aborted(AuthError::Protocol(
            "legacy auth reply is not an iq stanza".to_string(),
        ));
    }
    match element.attr("type") {
        Some("result") => AuthOutcome::Success,
        Some("error") => {
            let reason = match element.child("error") {
                Some(error) if error.attr("code") == Some("401") => FailureReason::NotAuthorized,
                Some(error) => FailureReason::Other(format!(
                    "legacy auth error (code {})",
                    error.attr("code").unwrap_or("unknown")
                )),
                // an iq error without an error child is structurally broken
                None => {
                    return AuthOutcome::Aborted(AuthError::Protocol(
                        "legacy auth error reply without error child".to_string(),
                    ))
                }
            };
            AuthOutcome::Failure(reason)
        }
        _ => AuthOutcome::Aborted(AuthError::Protocol(
            "legacy auth reply has no usable iq type".to_string(),
        )),
    }
}
