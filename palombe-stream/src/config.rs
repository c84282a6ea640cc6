use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Abort unless the transport-security upgrade completes.
    Require,
    /// Attempt the upgrade when offered.
    Prefer,
    /// Never attempt the upgrade.
    Disabled,
}

/// Security posture of one account's connection attempts, as read from the
/// client configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityPolicy {
    #[serde(default = "default_tls")]
    pub tls: TlsPolicy,
    /// Continue unencrypted when a preferred upgrade is refused by the
    /// server. Off by default: a refusal aborts the attempt.
    #[serde(default)]
    pub allow_insecure_fallback: bool,
    /// Permit mechanisms that expose the credential over an unencrypted
    /// channel. Off by default.
    #[serde(default)]
    pub allow_plaintext_mechanisms: bool,
    /// Permit the legacy single-round authentication path when the server
    /// does not support mechanism negotiation at all.
    #[serde(default)]
    pub allow_legacy_auth: bool,
}

fn default_tls() -> TlsPolicy {
    TlsPolicy::Require
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            tls: TlsPolicy::Require,
            allow_insecure_fallback: false,
            allow_plaintext_mechanisms: false,
            allow_legacy_auth: false,
        }
    }
}
