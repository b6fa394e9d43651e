//! Chained-MAC capability tokens
//!
//! A token is an identifier, a location tag, an ordered list of caveats and a
//! signature. The signature starts as a MAC over the identifier and location
//! keyed by the root secret, and every appended caveat re-keys the MAC with
//! the previous signature:
//!
//! ```text
//! sig_0 = HMAC(HMAC(KEY_GENERATOR, root), len(id) || id || location)
//! sig_n = HMAC(sig_{n-1}, caveat_n)
//! ```
//!
//! Anyone holding a token can therefore append caveats (attenuate it), but
//! nobody without the root secret can remove or alter one.

use crate::caveat::Caveat;
use crate::secret::RootSecret;
use crate::{AuthError, Result};
use bincode::Options;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Binary format version written into every token
pub const TOKEN_VERSION: u8 = 1;

/// Upper bound on the encoded size of a token
pub const MAX_TOKEN_BYTES: u64 = 8 * 1024;

const KEY_GENERATOR: &[u8] = b"datastore-capability-key";

/// Signature length in bytes
pub const SIGNATURE_LEN: usize = 32;

/// An append-only capability token
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToken {
    version: u8,
    identifier: Vec<u8>,
    location: String,
    caveats: Vec<Vec<u8>>,
    signature: [u8; SIGNATURE_LEN],
}

impl CapabilityToken {
    /// Create a root token for `identifier` at `location`
    pub(crate) fn root(secret: &RootSecret, identifier: &[u8], location: &str) -> Self {
        let key = keyed_mac(KEY_GENERATOR, &[secret.expose()]);
        let length = (identifier.len() as u64).to_be_bytes();
        let signature = keyed_mac(&key, &[&length, identifier, location.as_bytes()]);
        Self {
            version: TOKEN_VERSION,
            identifier: identifier.to_vec(),
            location: location.to_string(),
            caveats: Vec::new(),
            signature,
        }
    }

    /// Identifier the token was minted for
    pub fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    /// Location tag of the issuing service
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Number of caveats in the chain
    pub fn caveat_count(&self) -> usize {
        self.caveats.len()
    }

    /// Final signature of the chain
    pub fn signature(&self) -> &[u8; SIGNATURE_LEN] {
        &self.signature
    }

    /// Derive a child token with `caveat` appended
    pub fn with_caveat(&self, caveat: &Caveat) -> Self {
        self.with_raw_caveat(caveat.encode())
    }

    /// Derive a child token with raw caveat bytes appended
    ///
    /// The bytes are authenticated but not validated; the gate rejects
    /// anything that does not parse.
    pub fn with_raw_caveat(&self, caveat: impl Into<Vec<u8>>) -> Self {
        let mut child = self.clone();
        child.push(caveat.into());
        child
    }

    /// Derive a child token with every caveat in `caveats` appended in order
    pub fn attenuate<'a>(&self, caveats: impl IntoIterator<Item = &'a Caveat>) -> Self {
        let mut child = self.clone();
        for caveat in caveats {
            child.push(caveat.encode().into_bytes());
        }
        child
    }

    fn push(&mut self, caveat: Vec<u8>) {
        self.signature = keyed_mac(&self.signature, &[&caveat]);
        self.caveats.push(caveat);
    }

    /// Recompute the MAC chain and compare it with the carried signature
    pub fn verify(self, secret: &RootSecret) -> Result<VerifiedToken> {
        let expected = self
            .caveats
            .iter()
            .fold(
                Self::root(secret, &self.identifier, &self.location).signature,
                |signature, caveat| keyed_mac(&signature, &[caveat]),
            );

        if bool::from(expected[..].ct_eq(&self.signature[..])) {
            Ok(VerifiedToken { token: self })
        } else {
            Err(AuthError::BadSignature)
        }
    }

    /// Binary encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        codec()
            .serialize(self)
            .map_err(|e| AuthError::bad_format(format!("Failed to encode token: {e}")))
    }

    /// Decode the binary encoding
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let token: Self = codec()
            .deserialize(bytes)
            .map_err(|e| AuthError::bad_format(format!("Failed to decode token: {e}")))?;
        if token.version != TOKEN_VERSION {
            return Err(AuthError::bad_format(format!(
                "Unsupported token version {}",
                token.version
            )));
        }
        Ok(token)
    }

    /// Hex transport encoding, as carried in a bearer header
    pub fn to_hex(&self) -> Result<String> {
        self.to_bytes().map(hex::encode)
    }

    /// Decode the hex transport encoding
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded).map_err(|e| AuthError::bad_encoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityToken")
            .field("identifier", &String::from_utf8_lossy(&self.identifier))
            .field("location", &self.location)
            .field(
                "caveats",
                &self
                    .caveats
                    .iter()
                    .map(|caveat| String::from_utf8_lossy(caveat))
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// A token whose MAC chain has been checked against the root secret
///
/// Caveats can only be read from this type, so nothing inspects a caveat
/// before the chain is known to be intact.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    token: CapabilityToken,
}

impl VerifiedToken {
    /// Identifier the token was minted for
    pub fn identifier(&self) -> &[u8] {
        &self.token.identifier
    }

    /// Location tag of the issuing service
    pub fn location(&self) -> &str {
        &self.token.location
    }

    /// Caveats in append order, each parsed on demand
    pub fn caveats(&self) -> impl Iterator<Item = Result<Caveat>> + '_ {
        self.token
            .caveats
            .iter()
            .map(|bytes| Caveat::from_bytes(bytes.as_slice()))
    }

    /// Underlying token
    pub fn into_inner(self) -> CapabilityToken {
        self.token
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_TOKEN_BYTES)
}

fn keyed_mac(key: &[u8], parts: &[&[u8]]) -> [u8; SIGNATURE_LEN] {
    #[allow(clippy::expect_used)]
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    let mut signature = [0u8; SIGNATURE_LEN];
    signature.copy_from_slice(&mac.finalize().into_bytes());
    signature
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caveat::AccessMode;
    use assert_matches::assert_matches;

    fn secret() -> RootSecret {
        RootSecret::new(b"ROOT KEY".to_vec()).unwrap()
    }

    fn write_token() -> CapabilityToken {
        CapabilityToken::root(&secret(), b"account1", "svc.example").attenuate(&[
            Caveat::Entity("account1".to_string()),
            Caveat::Action(AccessMode::Write),
        ])
    }

    #[test]
    fn test_signature_is_deterministic() {
        assert_eq!(write_token().signature(), write_token().signature());
    }

    #[test]
    fn test_appending_leaves_parent_untouched() {
        let root = CapabilityToken::root(&secret(), b"account1", "svc.example");
        let before = root.clone();
        let read = root.with_caveat(&Caveat::Action(AccessMode::Read));
        let write = root.with_caveat(&Caveat::Action(AccessMode::Write));

        assert_eq!(root, before);
        assert_eq!(root.caveat_count(), 0);
        assert_eq!(read.caveat_count(), 1);
        assert_ne!(read.signature(), write.signature());
        assert_ne!(read.signature(), root.signature());
    }

    #[test]
    fn test_verify_accepts_intact_chain() {
        let verified = write_token().verify(&secret()).unwrap();
        let caveats: Vec<Caveat> = verified.caveats().collect::<Result<_>>().unwrap();
        assert_eq!(
            caveats,
            vec![
                Caveat::Entity("account1".to_string()),
                Caveat::Action(AccessMode::Write),
            ]
        );
        assert_eq!(verified.identifier(), b"account1");
        assert_eq!(verified.location(), "svc.example");
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let other = RootSecret::new(b"OTHER KEY".to_vec()).unwrap();
        assert_matches!(write_token().verify(&other), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_dropping_a_caveat_breaks_the_chain() {
        let mut token = write_token();
        token.caveats.pop();
        assert_matches!(token.verify(&secret()), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_reordering_caveats_breaks_the_chain() {
        let mut token = write_token();
        token.caveats.swap(0, 1);
        assert_matches!(token.verify(&secret()), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_location_is_bound() {
        let mut token = write_token();
        token.location = "evil.example".to_string();
        assert_matches!(token.verify(&secret()), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_binary_round_trip() {
        let token = write_token();
        let decoded = CapabilityToken::from_hex(&token.to_hex().unwrap()).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_decoding_failures() {
        assert_matches!(
            CapabilityToken::from_hex("not hex"),
            Err(AuthError::BadEncoding { .. })
        );
        assert_matches!(
            CapabilityToken::from_hex("00ff"),
            Err(AuthError::BadFormat { .. })
        );

        let mut token = write_token();
        token.version = 9;
        let bytes = codec().serialize(&token).unwrap();
        assert_matches!(
            CapabilityToken::from_bytes(&bytes),
            Err(AuthError::BadFormat { .. })
        );
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bytes = write_token().to_bytes().unwrap();
        bytes.push(0);
        assert_matches!(
            CapabilityToken::from_bytes(&bytes),
            Err(AuthError::BadFormat { .. })
        );
    }

    #[test]
    fn test_debug_omits_signature() {
        let rendered = format!("{:?}", write_token());
        assert!(rendered.contains("entity = account1"));
        assert!(!rendered.contains("signature"));
    }
}
