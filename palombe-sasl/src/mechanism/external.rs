//! Delegated mechanism: the whole exchange is deferred to an external
//! security-library bridge supplied by the embedder (system SASL library,
//! GSSAPI wrapper, smartcard agent, ...). This crate only carries the
//! rounds back and forth.

use super::{Mechanism, RoundPayload};
use crate::error::MechanismError;
use crate::types::AttemptContext;

pub const EXTERNAL: &str = "EXTERNAL";

/// Seam towards an external security library driving the exchange.
pub trait SecurityBridge {
    /// Produces the initial payload of the delegated exchange.
    fn start_exchange(&mut self, cx: &AttemptContext) -> Result<RoundPayload, MechanismError>;

    /// Answers one server challenge.
    fn step(&mut self, cx: &AttemptContext, challenge: &[u8])
        -> Result<RoundPayload, MechanismError>;
}

/// Default bridge for SASL EXTERNAL: the transport layer (client
/// certificate) already proved who we are, so the exchange reduces to
/// naming the authorization identity.
pub struct CertIdentityBridge;

impl SecurityBridge for CertIdentityBridge {
    fn start_exchange(&mut self, cx: &AttemptContext) -> Result<RoundPayload, MechanismError> {
        let authzid = cx
            .credential
            .token
            .clone()
            .unwrap_or_else(|| cx.credential.identity.clone());
        Ok(Some(authzid.into_bytes()))
    }

    fn step(
        &mut self,
        _cx: &AttemptContext,
        _challenge: &[u8],
    ) -> Result<RoundPayload, MechanismError> {
        Err(MechanismError::UnexpectedChallenge)
    }
}

pub struct Delegated {
    bridge: Box<dyn SecurityBridge + Send>,
    started: bool,
}

impl Delegated {
    pub fn new(bridge: Box<dyn SecurityBridge + Send>) -> Self {
        Self {
            bridge,
            started: false,
        }
    }

    pub fn external() -> Self {
        Self::new(Box::new(CertIdentityBridge))
    }
}

impl Mechanism for Delegated {
    fn start(&mut self, cx: &AttemptContext) -> Result<RoundPayload, MechanismError> {
        if self.started {
            return Err(MechanismError::AlreadyStarted);
        }
        self.started = true;
        self.bridge.start_exchange(cx)
    }

    fn handle_challenge(
        &mut self,
        cx: &AttemptContext,
        challenge: &[u8],
    ) -> Result<RoundPayload, MechanismError> {
        self.bridge.step(cx, challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Credential;

    #[test]
    fn cert_bridge_sends_the_token_as_authzid() {
        let cx = AttemptContext::new(
            "example.tld",
            Credential::new("alice@example.tld", Vec::new()).with_token("alice@example.tld"),
        );
        let mut mech = Delegated::external();
        let payload = mech.start(&cx).unwrap();
        assert_eq!(payload.as_deref(), Some(&b"alice@example.tld"[..]));
    }

    #[test]
    fn bridge_errors_surface_as_mechanism_errors() {
        struct FailingBridge;
        impl SecurityBridge for FailingBridge {
            fn start_exchange(
                &mut self,
                _cx: &AttemptContext,
            ) -> Result<RoundPayload, MechanismError> {
                Err(MechanismError::Bridge("library unavailable".to_string()))
            }
            fn step(
                &mut self,
                _cx: &AttemptContext,
                _challenge: &[u8],
            ) -> Result<RoundPayload, MechanismError> {
                unreachable!()
            }
        }

        let cx = AttemptContext::new("example.tld", Credential::new("alice", Vec::new()));
        let mut mech = Delegated::new(Box::new(FailingBridge));
        assert!(matches!(
            mech.start(&cx),
            Err(MechanismError::Bridge(_))
        ));
    }
}
