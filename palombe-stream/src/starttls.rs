//! One-shot transport-security upgrade negotiation.
//!
//! This module decides whether the upgrade must happen and drives the
//! single `<starttls/>` → `<proceed/>`/`<failure/>` exchange. The actual
//! TLS handshake belongs to the transport collaborator; we only tell it
//! when to swap channels and report how the server answered.

use palombe_sasl::element::Element;
use palombe_sasl::error::PolicyViolation;

use crate::config::{SecurityPolicy, TlsPolicy};

pub const NS_TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeResult {
    Established,
    Refused,
    ProtocolError,
}

pub fn offered(features: &Element) -> bool {
    features
        .child("starttls")
        .map(|el| el.ns() == Some(NS_TLS))
        .unwrap_or(false)
}

/// Whether the server marked the upgrade as mandatory.
pub fn required(features: &Element) -> bool {
    features
        .child("starttls")
        .map(|el| el.ns() == Some(NS_TLS) && el.child("required").is_some())
        .unwrap_or(false)
}

/// Gate decision for the current feature advertisement. `Ok(true)` means
/// the upgrade exchange must run before any mechanism is started.
pub fn should_upgrade(
    features: &Element,
    policy: &SecurityPolicy,
    secured: bool,
) -> Result<bool, PolicyViolation> {
    if secured {
        return Ok(false);
    }
    let offered = offered(features);
    match policy.tls {
        TlsPolicy::Disabled if required(features) => Err(PolicyViolation::TlsDisabledLocally),
        TlsPolicy::Disabled => Ok(false),
        TlsPolicy::Require if !offered => Err(PolicyViolation::TlsNotOffered),
        TlsPolicy::Require => Ok(true),
        TlsPolicy::Prefer => Ok(offered),
    }
}

pub fn begin_upgrade() -> Element {
    Element::new("starttls").with_attr("xmlns", NS_TLS)
}

pub fn on_upgrade_result(element: &Element) -> UpgradeResult {
    if element.ns() != Some(NS_TLS) {
        return UpgradeResult::ProtocolError;
    }
    match element.name.as_str() {
        "proceed" => UpgradeResult::Established,
        "failure" => UpgradeResult::Refused,
        _ => UpgradeResult::ProtocolError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features_with_starttls(required: bool) -> Element {
        let mut starttls = Element::new("starttls").with_attr("xmlns", NS_TLS);
        if required {
            starttls = starttls.with_child(Element::new("required"));
        }
        Element::new("features").with_child(starttls)
    }

    #[test]
    fn upgrade_required_by_policy() {
        let policy = SecurityPolicy::default();
        assert_eq!(
            should_upgrade(&features_with_starttls(false), &policy, false),
            Ok(true)
        );
        // already secured: never upgrade twice
        assert_eq!(
            should_upgrade(&features_with_starttls(false), &policy, true),
            Ok(false)
        );
    }

    #[test]
    fn missing_offer_violates_a_require_policy() {
        let policy = SecurityPolicy::default();
        let features = Element::new("features");
        assert_eq!(
            should_upgrade(&features, &policy, false),
            Err(PolicyViolation::TlsNotOffered)
        );
    }

    #[test]
    fn server_required_beats_local_disabled() {
        let policy = SecurityPolicy {
            tls: TlsPolicy::Disabled,
            ..SecurityPolicy::default()
        };
        assert_eq!(
            should_upgrade(&features_with_starttls(true), &policy, false),
            Err(PolicyViolation::TlsDisabledLocally)
        );
        assert_eq!(
            should_upgrade(&features_with_starttls(false), &policy, false),
            Ok(false)
        );
    }

    #[test]
    fn upgrade_result_mapping() {
        let proceed = Element::new("proceed").with_attr("xmlns", NS_TLS);
        assert_eq!(on_upgrade_result(&proceed), UpgradeResult::Established);

        let failure = Element::new("failure").with_attr("xmlns", NS_TLS);
        assert_eq!(on_upgrade_result(&failure), UpgradeResult::Refused);

        let stray = Element::new("proceed");
        assert_eq!(on_upgrade_result(&stray), UpgradeResult::ProtocolError);
    }
}
