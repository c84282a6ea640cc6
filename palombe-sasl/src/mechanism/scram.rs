//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677), without channel binding.
//!
//! The whole exchange is bound to the server-provided nonce and salt; the
//! credential itself never crosses the wire, and the `v=` signature in the
//! success payload proves the server also knows the stored key (mutual
//! authentication). Server messages are untrusted input and are parsed
//! strictly: a missing required attribute refuses the challenge instead of
//! guessing a default.

use base64::Engine;
use hmac::{Hmac, Mac};
use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::u32 as attr_u32,
    sequence::preceded,
};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{Mechanism, RoundPayload};
use crate::error::MechanismError;
use crate::types::AttemptContext;

pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

// gs2 header for "no channel binding", and its base64 as sent in c=.
const GS2_HEADER: &str = "n,,";
const GS2_HEADER_B64: &str = "biws";

const NONCE_LEN: usize = 24;

type HmacSha256 = Hmac<Sha256>;

enum Stage {
    Initial,
    SentClientFirst {
        client_nonce: String,
        client_first_bare: String,
    },
    SentClientFinal {
        server_signature: Vec<u8>,
    },
    Concluded,
}

pub struct ScramSha256 {
    stage: Stage,
    nonce: Option<String>,
}

impl ScramSha256 {
    pub fn new() -> Self {
        Self {
            stage: Stage::Initial,
            nonce: None,
        }
    }

    #[cfg(test)]
    fn with_nonce(nonce: &str) -> Self {
        Self {
            stage: Stage::Initial,
            nonce: Some(nonce.to_string()),
        }
    }

    fn fresh_nonce() -> String {
        let rng = rand::thread_rng();
        rng.sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect()
    }
}

impl Default for ScramSha256 {
    fn default() -> Self {
        Self::new()
    }
}

// RFC 5802: "=" and "," in the authentication identity must be escaped.
fn escape_username(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 32], MechanismError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| MechanismError::InvalidKey)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Hi() from RFC 5802: PBKDF2 over the mechanism's HMAC.
fn hi(secret: &[u8], salt: &[u8], iterations: u32) -> Result<Zeroizing<[u8; 32]>, MechanismError> {
    let mut round = hmac_sha256(secret, &[salt, &1u32.to_be_bytes()])?;
    let mut out = Zeroizing::new(round);
    for _ in 1..iterations {
        round = hmac_sha256(secret, &[&round])?;
        for (acc, byte) in out.iter_mut().zip(round.iter()) {
            *acc ^= *byte;
        }
    }
    Ok(out)
}

struct ServerFirst<'a> {
    nonce: &'a str,
    salt_b64: &'a str,
    iterations: u32,
}

fn attr_value(input: &str) -> nom::IResult<&str, &str> {
    take_while1(|c| c != ',')(input)
}

fn parse_server_first(input: &str) -> Result<ServerFirst<'_>, MechanismError> {
    type NomErr<'a> = nom::Err<nom::error::Error<&'a str>>;

    // A mandatory extension we do not know is a refusal, not a skip.
    if input.starts_with("m=") {
        return Err(MechanismError::MalformedChallenge("m"));
    }
    let (input, nonce) = preceded(tag("r="), attr_value)(input)
        .map_err(|_: NomErr| MechanismError::MalformedChallenge("r"))?;
    let (input, salt_b64) = preceded(tag(",s="), attr_value)(input)
        .map_err(|_: NomErr| MechanismError::MalformedChallenge("s"))?;
    let (_rest, iterations) = preceded(tag(",i="), attr_u32)(input)
        .map_err(|_: NomErr| MechanismError::MalformedChallenge("i"))?;

    Ok(ServerFirst {
        nonce,
        salt_b64,
        iterations,
    })
}

impl Mechanism for ScramSha256 {
    fn start(&mut self, cx: &AttemptContext) -> Result<RoundPayload, MechanismError> {
        if !matches!(self.stage, Stage::Initial) {
            return Err(MechanismError::AlreadyStarted);
        }
        if cx.credential.secret().is_empty() {
            return Err(MechanismError::MissingCredential);
        }

        let client_nonce = self.nonce.take().unwrap_or_else(Self::fresh_nonce);
        let client_first_bare = format!(
            "n={},r={}",
            escape_username(&cx.credential.identity),
            client_nonce
        );
        let message = format!("{}{}", GS2_HEADER, client_first_bare);

        self.stage = Stage::SentClientFirst {
            client_nonce,
            client_first_bare,
        };
        Ok(Some(message.into_bytes()))
    }

    fn handle_challenge(
        &mut self,
        cx: &AttemptContext,
        challenge: &[u8],
    ) -> Result<RoundPayload, MechanismError> {
        match std::mem::replace(&mut self.stage, Stage::Concluded) {
            Stage::SentClientFirst {
                client_nonce,
                client_first_bare,
            } => {
                let text = std::str::from_utf8(challenge)
                    .map_err(|_| MechanismError::MalformedChallenge("utf-8"))?;
                let server_first = parse_server_first(text)?;

                // The server nonce must be our nonce plus a server suffix.
                if !server_first.nonce.starts_with(&client_nonce)
                    || server_first.nonce.len() == client_nonce.len()
                {
                    return Err(MechanismError::NonceMismatch);
                }
                let salt = base64::engine::general_purpose::STANDARD
                    .decode(server_first.salt_b64)
                    .map_err(|_| MechanismError::MalformedChallenge("s"))?;
                if server_first.iterations == 0 {
                    return Err(MechanismError::MalformedChallenge("i"));
                }

                let salted = hi(cx.credential.secret(), &salt, server_first.iterations)?;
                let client_key = Zeroizing::new(hmac_sha256(&salted[..], &[b"Client Key"])?);
                let stored_key: [u8; 32] = Sha256::digest(&client_key[..]).into();

                let client_final_bare =
                    format!("c={},r={}", GS2_HEADER_B64, server_first.nonce);
                let auth_message =
                    format!("{},{},{}", client_first_bare, text, client_final_bare);

                let client_signature = hmac_sha256(&stored_key, &[auth_message.as_bytes()])?;
                let mut proof = [0u8; 32];
                for (i, byte) in proof.iter_mut().enumerate() {
                    *byte = client_key[i] ^ client_signature[i];
                }

                let server_key = Zeroizing::new(hmac_sha256(&salted[..], &[b"Server Key"])?);
                let server_signature =
                    hmac_sha256(&server_key[..], &[auth_message.as_bytes()])?;

                self.stage = Stage::SentClientFinal {
                    server_signature: server_signature.to_vec(),
                };

                let response = format!(
                    "{},p={}",
                    client_final_bare,
                    base64::engine::general_purpose::STANDARD.encode(proof)
                );
                Ok(Some(response.into_bytes()))
            }
            // After client-final the server must conclude with success or
            // failure; RFC 5802 has no further message.
            _ => Err(MechanismError::UnexpectedChallenge),
        }
    }

    fn handle_success(
        &mut self,
        _cx: &AttemptContext,
        proof: Option<&[u8]>,
    ) -> Result<bool, MechanismError> {
        match std::mem::replace(&mut self.stage, Stage::Concluded) {
            Stage::SentClientFinal { server_signature } => {
                // Mutual authentication is not optional here: no proof, no trust.
                let Some(data) = proof else {
                    return Ok(false);
                };
                let Ok(text) = std::str::from_utf8(data) else {
                    return Ok(false);
                };
                let Some(sig_b64) = text.strip_prefix("v=") else {
                    return Ok(false);
                };
                let sig_b64 = sig_b64.split(',').next().unwrap_or(sig_b64);
                let Ok(sig) = base64::engine::general_purpose::STANDARD.decode(sig_b64) else {
                    return Ok(false);
                };
                Ok(sig == server_signature)
            }
            // Success before our client-final went out: refuse to trust it.
            _ => Ok(false),
        }
    }

    fn dispose(&mut self) {
        self.stage = Stage::Concluded;
        self.nonce = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Credential;

    // Test vector from RFC 7677 section 3.
    const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &[u8] =
        b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const CLIENT_FINAL: &[u8] =
        b"c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
    const SERVER_FINAL: &[u8] = b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    fn cx() -> AttemptContext {
        AttemptContext::new("example.tld", Credential::new("user", b"pencil".to_vec()))
    }

    #[test]
    fn rfc7677_exchange() {
        let mut mech = ScramSha256::with_nonce(CLIENT_NONCE);

        let first = mech.start(&cx()).unwrap().unwrap();
        assert_eq!(first, b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO".to_vec());

        let response = mech.handle_challenge(&cx(), SERVER_FIRST).unwrap().unwrap();
        assert_eq!(response, CLIENT_FINAL.to_vec());

        assert!(mech.handle_success(&cx(), Some(SERVER_FINAL)).unwrap());
    }

    #[test]
    fn tampered_server_proof_is_refused() {
        let mut mech = ScramSha256::with_nonce(CLIENT_NONCE);
        mech.start(&cx()).unwrap();
        mech.handle_challenge(&cx(), SERVER_FIRST).unwrap();

        let ok = mech
            .handle_success(&cx(), Some(b"v=AAAATRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4="))
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn absent_proof_is_refused() {
        let mut mech = ScramSha256::with_nonce(CLIENT_NONCE);
        mech.start(&cx()).unwrap();
        mech.handle_challenge(&cx(), SERVER_FIRST).unwrap();
        assert!(!mech.handle_success(&cx(), None).unwrap());
    }

    #[test]
    fn challenge_without_nonce_is_malformed() {
        let mut mech = ScramSha256::new();
        mech.start(&cx()).unwrap();
        assert_eq!(
            mech.handle_challenge(&cx(), b"s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096"),
            Err(MechanismError::MalformedChallenge("r"))
        );
    }

    #[test]
    fn challenge_without_salt_or_iterations_is_malformed() {
        let mut mech = ScramSha256::with_nonce(CLIENT_NONCE);
        mech.start(&cx()).unwrap();
        assert_eq!(
            mech.handle_challenge(&cx(), b"r=rOprNGfwEbeRWgbNEkqOfoo,i=4096"),
            Err(MechanismError::MalformedChallenge("s"))
        );

        let mut mech = ScramSha256::with_nonce(CLIENT_NONCE);
        mech.start(&cx()).unwrap();
        assert_eq!(
            mech.handle_challenge(&cx(), b"r=rOprNGfwEbeRWgbNEkqOfoo,s=W22ZaJ0SNY7soEsUEjb6gQ=="),
            Err(MechanismError::MalformedChallenge("i"))
        );
    }

    #[test]
    fn foreign_nonce_is_rejected() {
        let mut mech = ScramSha256::with_nonce(CLIENT_NONCE);
        mech.start(&cx()).unwrap();
        assert_eq!(
            mech.handle_challenge(&cx(), b"r=somebodyElsesNonce,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096"),
            Err(MechanismError::NonceMismatch)
        );
    }

    #[test]
    fn nonce_must_be_extended_not_echoed() {
        let mut mech = ScramSha256::with_nonce(CLIENT_NONCE);
        mech.start(&cx()).unwrap();
        let echoed = format!("r={},s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096", CLIENT_NONCE);
        assert_eq!(
            mech.handle_challenge(&cx(), echoed.as_bytes()),
            Err(MechanismError::NonceMismatch)
        );
    }

    #[test]
    fn second_challenge_after_client_final_is_refused() {
        let mut mech = ScramSha256::with_nonce(CLIENT_NONCE);
        mech.start(&cx()).unwrap();
        mech.handle_challenge(&cx(), SERVER_FIRST).unwrap();
        assert_eq!(
            mech.handle_challenge(&cx(), SERVER_FIRST),
            Err(MechanismError::UnexpectedChallenge)
        );
    }

    #[test]
    fn username_special_characters_are_escaped() {
        let cx = AttemptContext::new(
            "example.tld",
            Credential::new("u=s,er", b"pencil".to_vec()),
        );
        let mut mech = ScramSha256::with_nonce(CLIENT_NONCE);
        let first = mech.start(&cx).unwrap().unwrap();
        assert_eq!(
            first,
            b"n,,n=u=3Ds=2Cer,r=rOprNGfwEbeRWgbNEkqO".to_vec()
        );
    }

    #[test]
    fn double_start_is_refused() {
        let mut mech = ScramSha256::new();
        mech.start(&cx()).unwrap();
        assert_eq!(mech.start(&cx()), Err(MechanismError::AlreadyStarted));
    }
}
