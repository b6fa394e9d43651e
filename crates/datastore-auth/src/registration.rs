//! Registration: proof check, minting, and sealed delivery
//!
//! A requester proves control of its identity by signing
//! `"<encryption_public_key>|<timestamp>"`, and receives one read and one
//! write token, each sealed to the encryption key it registered.

use crate::account::AccountKeys;
use crate::caveat::AccessMode;
use crate::identity::{registration_message, verify_identity};
use crate::minter::Minter;
use crate::sealing::{open_token, seal_token, BoxPublicKey, BoxSecretKey};
use crate::token::CapabilityToken;
use crate::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Registration request body; binary fields are hex-encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Client timestamp included in the signed message
    pub timestamp: String,
    /// Signature over the registration message
    pub signature: String,
    /// Requester identity (account number)
    pub requester: String,
    /// X25519 public key tokens are sealed to
    pub encryption_public_key: String,
}

impl RegistrationRequest {
    /// Build a signed request for `keys`
    pub fn signed(keys: &AccountKeys, timestamp: impl Into<String>) -> Self {
        let timestamp = timestamp.into();
        let encryption_public_key = keys.encryption_public_key().to_hex();
        let message = registration_message(&encryption_public_key, &timestamp);
        Self {
            signature: hex::encode(keys.sign(message.as_bytes())),
            requester: keys.account_number().to_string(),
            encryption_public_key,
            timestamp,
        }
    }

    /// Message the signature must cover
    pub fn message(&self) -> String {
        registration_message(&self.encryption_public_key, &self.timestamp)
    }
}

/// Registration response body: sealed read and write tokens, hex-encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// Sealed read token
    pub r: String,
    /// Sealed write token
    pub w: String,
}

impl RegistrationResponse {
    /// Sealed token for `mode`
    pub fn sealed(&self, mode: AccessMode) -> &str {
        match mode {
            AccessMode::Read => &self.r,
            AccessMode::Write => &self.w,
        }
    }

    /// Open the token for `mode` as the requester
    pub fn open(
        &self,
        mode: AccessMode,
        server: &BoxPublicKey,
        requester: &BoxSecretKey,
    ) -> Result<CapabilityToken> {
        open_token(self.sealed(mode), server, requester)
    }
}

/// Handles registration requests
#[derive(Debug, Clone)]
pub struct Registrar {
    minter: Minter,
    server: Arc<AccountKeys>,
    participants: Option<Arc<HashSet<String>>>,
}

impl Registrar {
    /// Create a registrar sealing tokens with the server's keys
    pub fn new(minter: Minter, server: Arc<AccountKeys>) -> Self {
        Self {
            minter,
            server,
            participants: None,
        }
    }

    /// Restrict registration to the given identities
    pub fn with_participants(mut self, participants: HashSet<String>) -> Self {
        self.participants = Some(Arc::new(participants));
        self
    }

    /// Server account whose encryption key seals the tokens
    pub fn server(&self) -> &AccountKeys {
        &self.server
    }

    /// Verify the proof, then mint and seal read and write tokens
    pub fn register(&self, request: &RegistrationRequest) -> Result<RegistrationResponse> {
        let signature = hex::decode(&request.signature)
            .map_err(|e| AuthError::invalid_encoding("signature", e.to_string()))?;
        verify_identity(&request.requester, request.message().as_bytes(), &signature)?;

        if let Some(participants) = &self.participants {
            if !participants.contains(&request.requester) {
                return Err(AuthError::UnknownParticipant {
                    identity: request.requester.clone(),
                });
            }
        }

        let recipient = hex::decode(&request.encryption_public_key)
            .map_err(|e| AuthError::invalid_encoding("encryption_public_key", e.to_string()))?;

        let tokens = self.minter.mint_modes(&request.requester)?;
        let sender = self.server.encryption_key();
        let response = RegistrationResponse {
            r: seal_token(&tokens.read, &recipient, sender)?,
            w: seal_token(&tokens.write, &recipient, sender)?,
        };

        info!(requester = %request.requester, "registered requester");
        Ok(response)
    }
}
