//! RFC 4616 PLAIN: `authzid \0 authcid \0 password` in a single initial
//! payload. Only ever selected once the channel is secured (or when policy
//! explicitly allows a plaintext channel).

use super::{Mechanism, RoundPayload};
use crate::error::MechanismError;
use crate::types::AttemptContext;

pub const PLAIN: &str = "PLAIN";

#[derive(Default)]
pub struct Plain {
    started: bool,
}

impl Plain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mechanism for Plain {
    fn start(&mut self, cx: &AttemptContext) -> Result<RoundPayload, MechanismError> {
        if self.started {
            return Err(MechanismError::AlreadyStarted);
        }
        self.started = true;

        if cx.credential.secret().is_empty() {
            return Err(MechanismError::MissingCredential);
        }

        let mut payload = Vec::new();
        if let Some(authzid) = &cx.credential.token {
            payload.extend_from_slice(authzid.as_bytes());
        }
        payload.push(0);
        payload.extend_from_slice(cx.credential.identity.as_bytes());
        payload.push(0);
        payload.extend_from_slice(cx.credential.secret());
        Ok(Some(payload))
    }

    fn handle_challenge(
        &mut self,
        _cx: &AttemptContext,
        _challenge: &[u8],
    ) -> Result<RoundPayload, MechanismError> {
        // Single-round mechanism, a challenge is a server bug.
        Err(MechanismError::UnexpectedChallenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Credential;

    fn cx() -> AttemptContext {
        AttemptContext::new("example.tld", Credential::new("user", b"pencil".to_vec()))
    }

    #[test]
    fn initial_payload_is_nul_joined() {
        let mut mech = Plain::new();
        let payload = mech.start(&cx()).unwrap();
        assert_eq!(payload.as_deref(), Some(&b"\0user\0pencil"[..]));
    }

    #[test]
    fn token_fills_the_authzid_slot() {
        let cx = AttemptContext::new(
            "example.tld",
            Credential::new("user", b"pencil".to_vec()).with_token("admin"),
        );
        let mut mech = Plain::new();
        let payload = mech.start(&cx).unwrap();
        assert_eq!(payload.as_deref(), Some(&b"admin\0user\0pencil"[..]));
    }

    #[test]
    fn double_start_is_refused() {
        let mut mech = Plain::new();
        mech.start(&cx()).unwrap();
        assert_eq!(mech.start(&cx()), Err(MechanismError::AlreadyStarted));
    }

    #[test]
    fn challenge_is_a_protocol_misuse() {
        let mut mech = Plain::new();
        mech.start(&cx()).unwrap();
        assert_eq!(
            mech.handle_challenge(&cx(), b"anything"),
            Err(MechanismError::UnexpectedChallenge)
        );
    }

    #[test]
    fn empty_secret_is_detected_locally() {
        let cx = AttemptContext::new("example.tld", Credential::new("user", Vec::new()));
        let mut mech = Plain::new();
        assert_eq!(mech.start(&cx), Err(MechanismError::MissingCredential));
    }
}
