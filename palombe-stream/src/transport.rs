use palombe_sasl::element::Element;

/// Connection-side collaborator the negotiation core talks to.
///
/// The transport owns the socket and the TLS machinery; the core never
/// touches bytes. `secure_channel` asks it to run the cryptographic
/// handshake and swap channels; completion comes back as an
/// [`crate::flow::AuthEvent::TransportSecured`] event (failure as
/// `TransportFailed`).
pub trait Transport {
    /// Hands one outbound element to the connection. Exactly one element
    /// is in flight awaiting a reply at any time.
    fn send(&mut self, element: Element);

    /// Swap the underlying channel for a secured one.
    fn secure_channel(&mut self);
}
