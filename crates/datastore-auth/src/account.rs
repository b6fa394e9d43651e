//! Account key material
//!
//! One 32-byte seed yields both keys an account needs: an Ed25519 signing key
//! (whose public half is the account number) and an X25519 secret for sealed
//! token delivery. The two are derived with HKDF-SHA256 under distinct labels
//! so neither can be computed from the other.

use crate::identity::AccountNumber;
use crate::sealing::{BoxPublicKey, BoxSecretKey};
use crate::{AuthError, Result};
use ed25519_dalek::{Signer, SigningKey, SIGNATURE_LENGTH};
use hkdf::Hkdf;
use rand_core::{CryptoRng, RngCore};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

/// Seed length in bytes
pub const SEED_LEN: usize = 32;

const SIGNING_INFO: &[u8] = b"datastore.account.signing.v1";
const ENCRYPTION_INFO: &[u8] = b"datastore.account.encryption.v1";

/// Signing and encryption keys of one account
#[derive(Clone)]
pub struct AccountKeys {
    signing_key: SigningKey,
    encryption_key: BoxSecretKey,
}

impl AccountKeys {
    /// Derive account keys from a seed
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Result<Self> {
        let hk = Hkdf::<Sha256>::new(None, seed);

        let mut signing = Zeroizing::new([0u8; 32]);
        hk.expand(SIGNING_INFO, &mut signing[..])
            .map_err(|e| AuthError::encryption(format!("HKDF expansion failed: {e}")))?;

        let mut encryption = Zeroizing::new([0u8; 32]);
        hk.expand(ENCRYPTION_INFO, &mut encryption[..])
            .map_err(|e| AuthError::encryption(format!("HKDF expansion failed: {e}")))?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&signing),
            encryption_key: BoxSecretKey::from_bytes(*encryption),
        })
    }

    /// Decode a hex-encoded seed
    pub fn from_hex_seed(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(encoded.trim())
                .map_err(|e| AuthError::invalid_encoding("account_seed", e.to_string()))?,
        );
        if bytes.len() != SEED_LEN {
            return Err(AuthError::invalid_encoding(
                "account_seed",
                format!("expected {SEED_LEN} bytes, got {}", bytes.len()),
            ));
        }
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        seed.copy_from_slice(&bytes);
        Self::from_seed(&seed)
    }

    /// Generate a fresh account
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        rng.fill_bytes(&mut seed[..]);
        Self::from_seed(&seed)
    }

    /// Identity of this account
    pub fn account_number(&self) -> AccountNumber {
        AccountNumber::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Sign `message`
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Public key tokens are sealed to
    pub fn encryption_public_key(&self) -> BoxPublicKey {
        self.encryption_key.public_key()
    }

    /// Secret key used to seal and open tokens
    pub fn encryption_key(&self) -> &BoxSecretKey {
        &self.encryption_key
    }
}

impl fmt::Debug for AccountKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKeys")
            .field("account_number", &self.account_number().to_string())
            .finish_non_exhaustive()
    }
}
