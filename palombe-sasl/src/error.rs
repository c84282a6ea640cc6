use std::fmt;

use thiserror::Error;

use crate::codec::CodecError;
use crate::element::Element;

/// Server-declared (or locally detected) reason for a refused credential,
/// as carried by the condition child of a `<failure/>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Aborted,
    AccountDisabled,
    CredentialsExpired,
    EncryptionRequired,
    IncorrectEncoding,
    InvalidAuthzid,
    InvalidMechanism,
    MalformedRequest,
    MechanismTooWeak,
    NotAuthorized,
    TemporaryAuthFailure,
    /// The server's mutual-authentication proof did not verify locally.
    MutualAuthFailed,
    Other(String),
}

impl FailureReason {
    /// Maps the first condition child of a `<failure/>` element.
    pub fn from_element(failure: &Element) -> Self {
        let condition = failure.children.iter().find_map(|node| match node {
            crate::element::Node::Element(el) => Some(el.name.as_str()),
            _ => None,
        });
        match condition {
            Some("aborted") => Self::Aborted,
            Some("account-disabled") => Self::AccountDisabled,
            Some("credentials-expired") => Self::CredentialsExpired,
            Some("encryption-required") => Self::EncryptionRequired,
            Some("incorrect-encoding") => Self::IncorrectEncoding,
            Some("invalid-authzid") => Self::InvalidAuthzid,
            Some("invalid-mechanism") => Self::InvalidMechanism,
            Some("malformed-request") => Self::MalformedRequest,
            Some("mechanism-too-weak") => Self::MechanismTooWeak,
            Some("not-authorized") => Self::NotAuthorized,
            Some("temporary-auth-failure") => Self::TemporaryAuthFailure,
            Some(other) => Self::Other(other.to_string()),
            None => Self::Other("unspecified".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Aborted => "aborted",
            Self::AccountDisabled => "account-disabled",
            Self::CredentialsExpired => "credentials-expired",
            Self::EncryptionRequired => "encryption-required",
            Self::IncorrectEncoding => "incorrect-encoding",
            Self::InvalidAuthzid => "invalid-authzid",
            Self::InvalidMechanism => "invalid-mechanism",
            Self::MalformedRequest => "malformed-request",
            Self::MechanismTooWeak => "mechanism-too-weak",
            Self::NotAuthorized => "not-authorized",
            Self::TemporaryAuthFailure => "temporary-auth-failure",
            Self::MutualAuthFailed => "mutual-auth-failed",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by mechanism logic while interpreting server input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MechanismError {
    #[error("challenge is missing or corrupts required field `{0}`")]
    MalformedChallenge(&'static str),
    #[error("server nonce does not extend the client nonce")]
    NonceMismatch,
    #[error("mechanism was already started for this attempt")]
    AlreadyStarted,
    #[error("credential holds no usable secret for this mechanism")]
    MissingCredential,
    #[error("mechanism cannot answer a challenge at this point")]
    UnexpectedChallenge,
    #[error("hmac key setup failed")]
    InvalidKey,
    #[error("delegated security bridge failed: {0}")]
    Bridge(String),
}

/// Locally enforced security policy refusing to proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("transport security is required by policy but not offered by the server")]
    TlsNotOffered,
    #[error("transport security upgrade was refused by the server")]
    UpgradeRefused,
    #[error("server requires transport security but local policy disables it")]
    TlsDisabledLocally,
    #[error("no offered mechanism is acceptable over an unencrypted channel")]
    NoSecureMechanism,
    #[error("legacy plaintext authentication is not allowed on an unencrypted channel")]
    PlaintextLegacyDisallowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Malformed or state-inappropriate element. Always terminal.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("mechanism error: {0}")]
    Mechanism(#[from] MechanismError),
    #[error("security policy violation: {0}")]
    Policy(#[from] PolicyViolation),
    #[error("wire payload: {0}")]
    Encoding(#[from] CodecError),
    /// Detected before any network round-trip.
    #[error("no mutually supported authentication mechanism")]
    NoMechanism,
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("authentication cancelled locally")]
    Cancelled,
}

/// Terminal value of one authentication attempt. Produced exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    Failure(FailureReason),
    Aborted(AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    #[test]
    fn failure_condition_mapping() {
        let el = Element::new("failure")
            .with_attr("xmlns", "urn:ietf:params:xml:ns:xmpp-sasl")
            .with_child(Element::new("not-authorized"));
        assert_eq!(FailureReason::from_element(&el), FailureReason::NotAuthorized);

        let el = Element::new("failure").with_child(Element::new("quota-exceeded"));
        assert_eq!(
            FailureReason::from_element(&el),
            FailureReason::Other("quota-exceeded".to_string())
        );

        let el = Element::new("failure");
        assert!(matches!(FailureReason::from_element(&el), FailureReason::Other(_)));
    }
}
