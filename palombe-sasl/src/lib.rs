//! Client side of the SASL negotiation used by XML-stanza chat streams
//!
//! ## Trace
//!
//! ```text
//! S: <stream:features>
//!      <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>
//!      <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>
//!        <mechanism>SCRAM-SHA-256</mechanism>
//!        <mechanism>PLAIN</mechanism>
//!      </mechanisms>
//!    </stream:features>
//! C: <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>
//! S: <proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>
//!    ... channel swap, stream restart, features re-advertised ...
//! C: <auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl'
//!          mechanism='SCRAM-SHA-256'>biwsbj11c2VyLHI9...</auth>
//! S: <challenge xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>cj1yT3By...</challenge>
//! C: <response xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>Yz1iaXdz...</response>
//! S: <success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>dj02cnJp...</success>
//! ```
//!
//! ## RFC References
//!
//! SASL in XMPP - https://datatracker.ietf.org/doc/html/rfc6120#section-6
//! PLAIN SASL - https://datatracker.ietf.org/doc/html/rfc4616
//! SCRAM - https://datatracker.ietf.org/doc/html/rfc5802
//! SCRAM-SHA-256 - https://datatracker.ietf.org/doc/html/rfc7677

pub mod codec;
pub mod element;
pub mod error;
pub mod mechanism;
pub mod registry;
pub mod types;
