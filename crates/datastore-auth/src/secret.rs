//! Server root secret seeding every token's MAC chain

use crate::{AuthError, Result};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key held only by the issuer
///
/// Constructed once at startup and handed to both the minter and the gate.
/// The bytes are zeroized on drop and never appear in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootSecret(Vec<u8>);

impl RootSecret {
    /// Wrap raw key bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(AuthError::invalid_encoding(
                "root_secret",
                "root secret must not be empty",
            ));
        }
        Ok(Self(bytes))
    }

    /// Decode a hex-encoded key
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| AuthError::invalid_encoding("root_secret", e.to_string()))?;
        Self::new(bytes)
    }

    /// Key length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed secret
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootSecret({} bytes)", self.0.len())
    }
}
