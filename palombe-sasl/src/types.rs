use std::fmt;

use zeroize::Zeroizing;

/// Credential supplied by the caller for one connection attempt.
///
/// The secret lives in a [`Zeroizing`] buffer: it is wiped on every exit
/// path (success, failure, abort, cancellation) when the owning context
/// is dropped. Nothing in this crate copies it into long-lived storage.
pub struct Credential {
    pub identity: String,
    secret: Zeroizing<Vec<u8>>,
    /// Optional pre-authenticated token (authorization identity).
    pub token: Option<String>,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            identity: identity.into(),
            secret: Zeroizing::new(secret.into()),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Lends the secret to the active mechanism. Never clone this out.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .field("token", &self.token)
            .finish()
    }
}

/// Per-attempt context lent by reference to the active mechanism.
#[derive(Debug)]
pub struct AttemptContext {
    /// Target service domain the stream is addressed to.
    pub domain: String,
    /// Resource identifier, used by the legacy authentication path.
    pub resource: String,
    pub credential: Credential,
}

impl AttemptContext {
    pub fn new(domain: impl Into<String>, credential: Credential) -> Self {
        Self {
            domain: domain.into(),
            resource: "palombe".to_string(),
            credential,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_the_secret() {
        let cred = Credential::new("alice@example.tld", b"hunter2".to_vec());
        let printed = format!("{:?}", cred);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
