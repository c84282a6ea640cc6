//! End-to-end authentication state machine for one connection attempt.
//!
//! The flow is a suspended state machine resumed by discrete inbound
//! events; it performs no I/O itself and hands every outbound element to
//! the [`Transport`] collaborator. Order is strict: transport-security
//! gate, then mechanism selection, then the challenge/response loop, with
//! the legacy path only when the server negotiates nothing at all.

use palombe_sasl::codec;
use palombe_sasl::element::Element;
use palombe_sasl::error::{AuthError, AuthOutcome, FailureReason, PolicyViolation};
use palombe_sasl::mechanism::{Mechanism, RoundPayload};
use palombe_sasl::registry::Registry;
use palombe_sasl::types::AttemptContext;

use crate::config::SecurityPolicy;
use crate::legacy;
use crate::starttls::{self, UpgradeResult};
use crate::transport::Transport;

pub const NS_SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

/// Inbound events resuming the state machine. Suspension points sit
/// exactly between these events, never inside a mechanism call.
pub enum AuthEvent {
    /// A `<stream:features>` advertisement, fresh from the (possibly just
    /// secured and restarted) stream.
    StreamFeatures(Element),
    /// Any other element addressed to the negotiation layer.
    Element(Element),
    /// The transport finished swapping to the secured channel.
    TransportSecured,
    /// The transport failed (connection lost, handshake error, ...).
    TransportFailed(String),
}

enum State {
    Error,
    /// Waiting for the server's feature advertisement.
    AwaitFeatures,
    /// `<starttls/>` sent, waiting for proceed or failure.
    TlsRequested,
    /// Transport told to swap channels, waiting for completion.
    TlsHandshake,
    /// A mechanism exchange is live.
    Exchange {
        mechanism: Box<dyn Mechanism + Send>,
        name: &'static str,
    },
    /// Legacy iq-auth request sent, waiting for the iq reply.
    LegacyPending,
    Done(AuthOutcome),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::AwaitFeatures => "AwaitFeatures",
            Self::TlsRequested => "TlsRequested",
            Self::TlsHandshake => "TlsHandshake",
            Self::Exchange { .. } => "Exchange",
            Self::LegacyPending => "LegacyPending",
            Self::Done(_) => "Done",
        }
    }
}

pub struct AuthFlow<'r> {
    registry: &'r Registry,
    policy: SecurityPolicy,
    context: AttemptContext,
    stream_id: Option<String>,
    secured: bool,
    upgrade_attempted: bool,
    // kept around for the (policy-gated) continue-unencrypted path
    pending_features: Option<Element>,
    state: State,
}

impl<'r> AuthFlow<'r> {
    pub fn new(registry: &'r Registry, policy: SecurityPolicy, context: AttemptContext) -> Self {
        Self {
            registry,
            policy,
            context,
            stream_id: None,
            secured: false,
            upgrade_attempted: false,
            pending_features: None,
            state: State::AwaitFeatures,
        }
    }

    /// Stream id from the server's stream header; the legacy digest is
    /// derived from it.
    pub fn set_stream_id(&mut self, id: impl Into<String>) {
        self.stream_id = Some(id.into());
    }

    /// Mark the channel as already secured (e.g. a direct-TLS connection).
    pub fn with_secured_channel(mut self) -> Self {
        self.secured = true;
        self
    }

    pub fn outcome(&self) -> Option<&AuthOutcome> {
        match &self.state {
            State::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Feeds one inbound event. Returns the terminal outcome the first
    /// time the attempt concludes, `None` while it is still in flight.
    pub fn progress(
        &mut self,
        event: AuthEvent,
        transport: &mut dyn Transport,
    ) -> Option<AuthOutcome> {
        if let State::Done(_) = self.state {
            tracing::warn!("event after the attempt concluded, ignoring");
            return None;
        }

        let new_state = 'state: {
            match (std::mem::replace(&mut self.state, State::Error), event) {
                (state, AuthEvent::TransportFailed(reason)) => {
                    if let State::Exchange { mut mechanism, .. } = state {
                        mechanism.dispose();
                    }
                    State::Done(AuthOutcome::Aborted(AuthError::Transport(reason)))
                }
                (State::AwaitFeatures, AuthEvent::StreamFeatures(features)) => {
                    self.on_features(features, transport)
                }
                (State::TlsRequested, AuthEvent::Element(el)) => {
                    match starttls::on_upgrade_result(&el) {
                        UpgradeResult::Established => {
                            transport.secure_channel();
                            State::TlsHandshake
                        }
                        UpgradeResult::Refused => {
                            if self.policy.allow_insecure_fallback {
                                tracing::warn!(
                                    "server refused the security upgrade, continuing unencrypted by policy"
                                );
                                match self.pending_features.take() {
                                    Some(features) => {
                                        break 'state self.on_features(features, transport)
                                    }
                                    None => State::Done(AuthOutcome::Aborted(AuthError::Protocol(
                                        "upgrade refused with no feature set to fall back on"
                                            .to_string(),
                                    ))),
                                }
                            } else {
                                State::Done(AuthOutcome::Aborted(AuthError::Policy(
                                    PolicyViolation::UpgradeRefused,
                                )))
                            }
                        }
                        UpgradeResult::ProtocolError => {
                            State::Done(AuthOutcome::Aborted(AuthError::Protocol(
                                "unrecognized reply to the security upgrade request".to_string(),
                            )))
                        }
                    }
                }
                (State::TlsHandshake, AuthEvent::TransportSecured) => {
                    self.secured = true;
                    self.pending_features = None;
                    // the server re-advertises its features over the
                    // secured channel; only that advertisement is trusted
                    State::AwaitFeatures
                }
                (
                    State::Exchange { mechanism, name },
                    AuthEvent::Element(el),
                ) => self.on_exchange_element(mechanism, name, el, transport),
                (State::LegacyPending, AuthEvent::Element(el)) => {
                    State::Done(legacy::on_result(&el))
                }
                (State::Exchange { mut mechanism, .. }, _) => {
                    tracing::error!("event not valid during the mechanism exchange");
                    mechanism.dispose();
                    State::Done(AuthOutcome::Aborted(AuthError::Protocol(
                        "unexpected event during the mechanism exchange".to_string(),
                    )))
                }
                _ => {
                    tracing::error!("element not valid in the current negotiation state");
                    State::Done(AuthOutcome::Aborted(AuthError::Protocol(
                        "element not valid in the current negotiation state".to_string(),
                    )))
                }
            }
        };
        tracing::debug!(state = new_state.name(), "made progress");
        self.state = new_state;

        match &self.state {
            State::Done(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Hard cancel from the caller. Disposes any live mechanism, sends
    /// `<abort/>` if a round was in flight, and concludes the attempt.
    pub fn cancel(&mut self, transport: &mut dyn Transport) -> Option<AuthOutcome> {
        match std::mem::replace(&mut self.state, State::Error) {
            State::Done(outcome) => {
                self.state = State::Done(outcome);
                None
            }
            State::Exchange { mut mechanism, .. } => {
                transport.send(abort_element());
                mechanism.dispose();
                let outcome = AuthOutcome::Aborted(AuthError::Cancelled);
                self.state = State::Done(outcome.clone());
                Some(outcome)
            }
            _ => {
                let outcome = AuthOutcome::Aborted(AuthError::Cancelled);
                self.state = State::Done(outcome.clone());
                Some(outcome)
            }
        }
    }

    fn on_features(&mut self, features: Element, transport: &mut dyn Transport) -> State {
        if !self.secured && !self.upgrade_attempted {
            match starttls::should_upgrade(&features, &self.policy, self.secured) {
                Err(violation) => {
                    return State::Done(AuthOutcome::Aborted(AuthError::Policy(violation)))
                }
                Ok(true) => {
                    self.upgrade_attempted = true;
                    self.pending_features = Some(features);
                    transport.send(starttls::begin_upgrade());
                    return State::TlsRequested;
                }
                Ok(false) => {}
            }
        }

        let negotiated = features
            .child("mechanisms")
            .filter(|el| el.ns() == Some(NS_SASL));
        if let Some(mechanisms) = negotiated {
            let offered: Vec<String> = mechanisms
                .children_named("mechanism")
                .map(|m| m.text())
                .collect();
            return self.start_best_mechanism(&offered, transport);
        }

        if legacy::is_offered(&features) {
            if !self.policy.allow_legacy_auth {
                tracing::warn!("server only offers legacy auth, which policy disables");
                return State::Done(AuthOutcome::Aborted(AuthError::NoMechanism));
            }
            return match legacy::submit(
                &self.context,
                self.stream_id.as_deref(),
                &self.policy,
                self.secured,
            ) {
                Ok(iq) => {
                    transport.send(iq);
                    State::LegacyPending
                }
                Err(err) => State::Done(AuthOutcome::Aborted(err)),
            };
        }

        State::Done(AuthOutcome::Aborted(AuthError::NoMechanism))
    }

    fn start_best_mechanism(
        &mut self,
        offered: &[String],
        transport: &mut dyn Transport,
    ) -> State {
        let allow_plaintext_channel = self.secured || self.policy.allow_plaintext_mechanisms;

        if self.registry.select(offered, allow_plaintext_channel).is_none() {
            // distinguish "nothing in common" from "excluded by channel policy"
            let error = if self.registry.select(offered, true).is_some() {
                AuthError::Policy(PolicyViolation::NoSecureMechanism)
            } else {
                AuthError::NoMechanism
            };
            return State::Done(AuthOutcome::Aborted(error));
        }

        // Local pre-start fallback: walk the candidates until one produces
        // its initial payload. Once that payload is on the wire there is
        // no further mechanism-hopping (a failure then is terminal).
        let mut last_error = None;
        for entry in self.registry.eligible(offered, allow_plaintext_channel) {
            let mut mechanism = entry.instantiate();
            match mechanism.start(&self.context) {
                Ok(payload) => {
                    tracing::debug!(mechanism = entry.name(), "starting authentication");
                    transport.send(auth_element(entry.name(), payload));
                    return State::Exchange {
                        mechanism,
                        name: entry.name(),
                    };
                }
                Err(err) => {
                    tracing::warn!(
                        mechanism = entry.name(),
                        err = %err,
                        "mechanism cannot start, trying the next candidate"
                    );
                    mechanism.dispose();
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => State::Done(AuthOutcome::Aborted(AuthError::Mechanism(err))),
            None => State::Done(AuthOutcome::Aborted(AuthError::NoMechanism)),
        }
    }

    fn on_exchange_element(
        &mut self,
        mut mechanism: Box<dyn Mechanism + Send>,
        name: &'static str,
        el: Element,
        transport: &mut dyn Transport,
    ) -> State {
        if el.ns() != Some(NS_SASL) {
            mechanism.dispose();
            return State::Done(AuthOutcome::Aborted(AuthError::Protocol(
                "exchange element outside the negotiation namespace".to_string(),
            )));
        }

        match el.name.as_str() {
            "challenge" => {
                let payload = match codec::decode(&el.text()) {
                    Ok(p) => p,
                    Err(err) => {
                        mechanism.dispose();
                        return State::Done(AuthOutcome::Aborted(err.into()));
                    }
                };
                match mechanism.handle_challenge(&self.context, payload.as_deref().unwrap_or(&[]))
                {
                    Ok(response) => {
                        transport.send(response_element(response));
                        State::Exchange { mechanism, name }
                    }
                    Err(err) => {
                        tracing::error!(mechanism = name, err = %err, "challenge rejected");
                        transport.send(abort_element());
                        mechanism.dispose();
                        State::Done(AuthOutcome::Aborted(AuthError::Mechanism(err)))
                    }
                }
            }
            "success" => {
                let payload = match codec::decode(&el.text()) {
                    Ok(p) => p,
                    Err(err) => {
                        mechanism.dispose();
                        return State::Done(AuthOutcome::Aborted(err.into()));
                    }
                };
                match mechanism.handle_success(&self.context, payload.as_deref()) {
                    Ok(true) => {
                        mechanism.dispose();
                        tracing::debug!(mechanism = name, "authentication succeeded");
                        State::Done(AuthOutcome::Success)
                    }
                    Ok(false) => {
                        tracing::error!(
                            mechanism = name,
                            "server failed to prove itself, rejecting its success"
                        );
                        mechanism.dispose();
                        State::Done(AuthOutcome::Failure(FailureReason::MutualAuthFailed))
                    }
                    Err(err) => {
                        mechanism.dispose();
                        State::Done(AuthOutcome::Aborted(AuthError::Mechanism(err)))
                    }
                }
            }
            "failure" => {
                let reason = FailureReason::from_element(&el);
                mechanism.handle_failure(&self.context, &reason);
                mechanism.dispose();
                State::Done(AuthOutcome::Failure(reason))
            }
            _ => {
                mechanism.dispose();
                State::Done(AuthOutcome::Aborted(AuthError::Protocol(
                    "unexpected element during the mechanism exchange".to_string(),
                )))
            }
        }
    }
}

fn auth_element(mechanism: &str, payload: RoundPayload) -> Element {
    let mut el = Element::new("auth")
        .with_attr("xmlns", NS_SASL)
        .with_attr("mechanism", mechanism);
    let text = codec::encode(payload.as_deref());
    if !text.is_empty() {
        el = el.with_text(text);
    }
    el
}

fn response_element(payload: RoundPayload) -> Element {
    let mut el = Element::new("response").with_attr("xmlns", NS_SASL);
    let text = codec::encode(payload.as_deref());
    if !text.is_empty() {
        el = el.with_text(text);
    }
    el
}

fn abort_element() -> Element {
    Element::new("abort").with_attr("xmlns", NS_SASL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use palombe_sasl::types::Credential;

    #[derive(Default)]
    struct NullTransport {
        sent: Vec<Element>,
    }

    impl Transport for NullTransport {
        fn send(&mut self, element: Element) {
            self.sent.push(element);
        }
        fn secure_channel(&mut self) {}
    }

    fn flow(registry: &Registry) -> AuthFlow<'_> {
        AuthFlow::new(
            registry,
            SecurityPolicy::default(),
            AttemptContext::new("example.tld", Credential::new("alice", b"pencil".to_vec())),
        )
    }

    #[test]
    fn success_before_any_mechanism_is_a_protocol_error() {
        let registry = Registry::with_builtin();
        let mut flow = flow(&registry);
        let mut transport = NullTransport::default();

        let stray = Element::new("success").with_attr("xmlns", NS_SASL);
        let outcome = flow.progress(AuthEvent::Element(stray), &mut transport);
        assert!(matches!(
            outcome,
            Some(AuthOutcome::Aborted(AuthError::Protocol(_)))
        ));
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn events_after_conclusion_are_ignored() {
        let registry = Registry::with_builtin();
        let mut flow = flow(&registry);
        let mut transport = NullTransport::default();

        let stray = Element::new("success").with_attr("xmlns", NS_SASL);
        assert!(flow.progress(AuthEvent::Element(stray.clone()), &mut transport).is_some());
        // the outcome was already delivered once
        assert!(flow.progress(AuthEvent::Element(stray), &mut transport).is_none());
        assert!(flow.outcome().is_some());
    }

    #[test]
    fn transport_failure_aborts_from_any_state() {
        let registry = Registry::with_builtin();
        let mut flow = flow(&registry);
        let mut transport = NullTransport::default();

        let outcome = flow.progress(
            AuthEvent::TransportFailed("connection reset".to_string()),
            &mut transport,
        );
        assert_eq!(
            outcome,
            Some(AuthOutcome::Aborted(AuthError::Transport(
                "connection reset".to_string()
            )))
        );
    }

    #[test]
    fn cancel_before_start_concludes_quietly() {
        let registry = Registry::with_builtin();
        let mut flow = flow(&registry);
        let mut transport = NullTransport::default();

        let outcome = flow.cancel(&mut transport);
        assert_eq!(outcome, Some(AuthOutcome::Aborted(AuthError::Cancelled)));
        // nothing was in flight, so no abort element goes out
        assert!(transport.sent.is_empty());
        assert!(flow.cancel(&mut transport).is_none());
    }
}
