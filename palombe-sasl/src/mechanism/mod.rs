pub mod external;
pub mod plain;
pub mod scram;

use crate::error::{FailureReason, MechanismError};
use crate::types::AttemptContext;

/// Outbound payload of one mechanism round.
///
/// `None` means "no payload on this element"; `Some(vec![])` is an
/// intentionally empty response, which the codec renders as the explicit
/// empty-payload marker.
pub type RoundPayload = Option<Vec<u8>>;

/// One pluggable authentication strategy.
///
/// The controller drives exactly one instance per connection attempt:
/// `start` once, then zero or more `handle_challenge` rounds, then one of
/// `handle_success`/`handle_failure`, then `dispose`. Implementations deal
/// in raw payload bytes only; element wrapping and base64 belong to the
/// caller.
pub trait Mechanism {
    /// Produces the initial payload. Calling it a second time on the same
    /// instance is a caller bug and yields `AlreadyStarted`.
    fn start(&mut self, cx: &AttemptContext) -> Result<RoundPayload, MechanismError>;

    /// Consumes one server challenge and returns the next response.
    fn handle_challenge(
        &mut self,
        cx: &AttemptContext,
        challenge: &[u8],
    ) -> Result<RoundPayload, MechanismError>;

    /// Verifies any server proof carried by the success element.
    ///
    /// Mechanisms without mutual authentication keep the default and
    /// always trust the success. Returning `false` tells the controller
    /// the server failed to prove itself, which is a failure outcome
    /// distinct from a server-declared one.
    fn handle_success(
        &mut self,
        cx: &AttemptContext,
        proof: Option<&[u8]>,
    ) -> Result<bool, MechanismError> {
        let _ = (cx, proof);
        Ok(true)
    }

    /// Observability hook for a server-declared failure. Never fails.
    fn handle_failure(&mut self, cx: &AttemptContext, reason: &FailureReason) {
        let _ = cx;
        tracing::warn!(reason = %reason, "server declared authentication failure");
    }

    /// Releases mechanism-held secrets. Invoked exactly once per attempt,
    /// on every terminal path.
    fn dispose(&mut self) {}
}
