//! Text-safe envelope for challenge/response payloads.
//!
//! Auth elements carry their binary payloads as standard, padded base64.
//! The bare text `=` is the explicit empty-payload marker: it decodes to a
//! present, zero-length payload, which is not the same thing as an element
//! with no payload at all. Mechanisms rely on that distinction to send an
//! intentionally empty response.

use base64::Engine;

const EMPTY_MARKER: &str = "=";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("payload text is not valid base64")]
    InvalidEncoding,
}

pub fn encode(payload: Option<&[u8]>) -> String {
    match payload {
        None => String::new(),
        Some([]) => EMPTY_MARKER.to_string(),
        Some(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
    }
}

pub fn decode(wire: &str) -> Result<Option<Vec<u8>>, CodecError> {
    match wire {
        "" => Ok(None),
        EMPTY_MARKER => Ok(Some(Vec::new())),
        b64 => base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map(Some)
            .map_err(|_| CodecError::InvalidEncoding),
    }
}
