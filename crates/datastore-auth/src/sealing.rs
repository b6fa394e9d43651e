//! Authenticated public-key encryption for token delivery
//!
//! Both key pairs take part: the sender's X25519 secret and the recipient's
//! X25519 public key agree on a shared secret, HKDF-SHA256 turns it into an
//! XChaCha20-Poly1305 key, and the sealed box is `nonce || ciphertext`.
//! Only the recipient can open it, and opening it with the wrong sender
//! public key fails authentication.
//!
//! # Security
//!
//! - Nonces are 24 random bytes per seal
//! - Secret keys are zeroized on drop
//! - Low-order public keys are rejected

use crate::token::CapabilityToken;
use crate::{AuthError, Result};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use curve25519_dalek::montgomery::MontgomeryPoint;
use hkdf::Hkdf;
use rand_core::{CryptoRng, OsRng, RngCore};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// X25519 key length in bytes
pub const BOX_KEY_LEN: usize = 32;

/// XChaCha20-Poly1305 nonce length in bytes
pub const NONCE_LEN: usize = 24;

const TAG_LEN: usize = 16;
const KEY_INFO: &[u8] = b"datastore.token-box.v1";

/// X25519 secret key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BoxSecretKey([u8; BOX_KEY_LEN]);

/// X25519 public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxPublicKey([u8; BOX_KEY_LEN]);

impl BoxSecretKey {
    /// Wrap raw secret bytes
    pub fn from_bytes(bytes: [u8; BOX_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh secret key
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; BOX_KEY_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Matching public key
    pub fn public_key(&self) -> BoxPublicKey {
        BoxPublicKey(MontgomeryPoint::mul_base_clamped(self.0).to_bytes())
    }

    fn diffie_hellman(&self, public: &BoxPublicKey) -> Result<Zeroizing<[u8; BOX_KEY_LEN]>> {
        let shared = Zeroizing::new(MontgomeryPoint(public.0).mul_clamped(self.0).to_bytes());
        if bool::from(shared[..].ct_eq(&[0u8; BOX_KEY_LEN][..])) {
            return Err(AuthError::encryption("low-order public key"));
        }
        Ok(shared)
    }
}

impl fmt::Debug for BoxSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxSecretKey(..)")
    }
}

impl BoxPublicKey {
    /// Wrap raw public key bytes
    pub fn from_bytes(bytes: [u8; BOX_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a public key, rejecting wrong lengths
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; BOX_KEY_LEN] = bytes.try_into().map_err(|_| {
            AuthError::encryption(format!(
                "public key must be {BOX_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; BOX_KEY_LEN] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Seal `plaintext` from `sender` to `recipient`
pub fn seal(plaintext: &[u8], recipient: &BoxPublicKey, sender: &BoxSecretKey) -> Result<Vec<u8>> {
    seal_with_rng(plaintext, recipient, sender, &mut OsRng)
}

/// Seal with an explicit nonce source
pub fn seal_with_rng<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    recipient: &BoxPublicKey,
    sender: &BoxSecretKey,
    rng: &mut R,
) -> Result<Vec<u8>> {
    let key = box_key(sender, recipient, &sender.public_key(), recipient)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let nonce = XChaCha20Poly1305::generate_nonce(rng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AuthError::encryption(format!("XChaCha20-Poly1305 encryption failed: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed box, authenticating that `sender` produced it
pub fn open(sealed: &[u8], sender: &BoxPublicKey, recipient: &BoxSecretKey) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(AuthError::encryption(format!(
            "sealed box too short: {} bytes",
            sealed.len()
        )));
    }

    let key = box_key(recipient, sender, sender, &recipient.public_key())?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| AuthError::encryption("authentication failed"))
}

/// Seal a token's binary encoding and hex-encode the result
///
/// `recipient_key` is the raw public key as supplied by the requester.
pub fn seal_token(
    token: &CapabilityToken,
    recipient_key: &[u8],
    sender: &BoxSecretKey,
) -> Result<String> {
    let recipient = BoxPublicKey::from_slice(recipient_key)?;
    let bytes = token.to_bytes()?;
    seal(&bytes, &recipient, sender).map(hex::encode)
}

/// Reverse of [`seal_token`]
pub fn open_token(
    sealed_hex: &str,
    sender: &BoxPublicKey,
    recipient: &BoxSecretKey,
) -> Result<CapabilityToken> {
    let sealed =
        hex::decode(sealed_hex).map_err(|e| AuthError::encryption(format!("not hex: {e}")))?;
    let bytes = open(&sealed, sender, recipient)?;
    CapabilityToken::from_bytes(&bytes)
}

fn box_key(
    secret: &BoxSecretKey,
    peer: &BoxPublicKey,
    sender: &BoxPublicKey,
    recipient: &BoxPublicKey,
) -> Result<Zeroizing<[u8; 32]>> {
    let shared = secret.diffie_hellman(peer)?;

    let mut salt = [0u8; 2 * BOX_KEY_LEN];
    salt[..BOX_KEY_LEN].copy_from_slice(sender.as_bytes());
    salt[BOX_KEY_LEN..].copy_from_slice(recipient.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt), &shared[..]);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(KEY_INFO, &mut key[..])
        .map_err(|e| AuthError::encryption(format!("HKDF expansion failed: {e}")))?;
    Ok(key)
}
