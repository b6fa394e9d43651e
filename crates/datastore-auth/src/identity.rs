//! Identity verification for registration proofs
//!
//! An identity ("account number") is self-certifying: it is the hex encoding
//! of an Ed25519 public key followed by a 4-byte BLAKE3 checksum of that key.
//! Verifying a registration proof therefore needs nothing but the identity
//! string, the signed message and the signature.

use crate::{AuthError, Result};
use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use std::fmt;
use std::str::FromStr;

/// Length of the checksum suffix in bytes
pub const CHECKSUM_LEN: usize = 4;

/// Self-certifying requester identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountNumber {
    verifying_key: VerifyingKey,
}

impl AccountNumber {
    /// Account number of a verifying key
    pub fn from_verifying_key(verifying_key: VerifyingKey) -> Self {
        Self { verifying_key }
    }

    /// Parse an account number string
    pub fn parse(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|e| AuthError::invalid_encoding("requester", e.to_string()))?;
        if bytes.len() != PUBLIC_KEY_LENGTH + CHECKSUM_LEN {
            return Err(AuthError::invalid_encoding(
                "requester",
                format!(
                    "expected {} bytes, got {}",
                    PUBLIC_KEY_LENGTH + CHECKSUM_LEN,
                    bytes.len()
                ),
            ));
        }

        let (key, checksum) = bytes.split_at(PUBLIC_KEY_LENGTH);
        if checksum != key_checksum(key).as_slice() {
            return Err(AuthError::invalid_encoding("requester", "checksum mismatch"));
        }

        let mut key_bytes = [0u8; PUBLIC_KEY_LENGTH];
        key_bytes.copy_from_slice(key);
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| AuthError::invalid_encoding("requester", e.to_string()))?;
        Ok(Self { verifying_key })
    }

    /// Public key the identity certifies
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Check `signature` over `message` against this identity
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        if signature.len() != SIGNATURE_LENGTH {
            return Err(AuthError::invalid_encoding(
                "signature",
                format!("expected {SIGNATURE_LENGTH} bytes, got {}", signature.len()),
            ));
        }
        let signature = Signature::from_slice(signature)
            .map_err(|e| AuthError::invalid_encoding("signature", e.to_string()))?;

        self.verifying_key
            .verify_strict(message, &signature)
            .map_err(|_| AuthError::InvalidIdentitySignature)
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.verifying_key.as_bytes();
        write!(f, "{}{}", hex::encode(key), hex::encode(key_checksum(key)))
    }
}

impl FromStr for AccountNumber {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Verify a registration proof against the identity that claims it
pub fn verify_identity(identity: &str, message: &[u8], signature: &[u8]) -> Result<()> {
    AccountNumber::parse(identity)?.verify(message, signature)
}

/// Message a requester signs to register an encryption key
pub fn registration_message(encryption_public_key: &str, timestamp: &str) -> String {
    format!("{encryption_public_key}|{timestamp}")
}

fn key_checksum(key: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = blake3::hash(key);
    let mut checksum = [0u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&hash.as_bytes()[..CHECKSUM_LEN]);
    checksum
}
