//! Token minting
//!
//! Every requester gets one root token bound to (identity, location) and one
//! child per access mode. Children share the root prefix of the chain; the
//! root itself is never handed out.

use crate::caveat::{AccessMode, Caveat};
use crate::secret::RootSecret;
use crate::token::CapabilityToken;
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// Issues capability tokens for one service location
#[derive(Debug, Clone)]
pub struct Minter {
    secret: Arc<RootSecret>,
    location: String,
}

/// Tokens minted for a single requester, one per access mode
#[derive(Debug, Clone)]
pub struct ModeTokens {
    /// Token restricted to `action = read`
    pub read: CapabilityToken,
    /// Token restricted to `action = write`
    pub write: CapabilityToken,
}

impl ModeTokens {
    /// Token for `mode`
    pub fn get(&self, mode: AccessMode) -> &CapabilityToken {
        match mode {
            AccessMode::Read => &self.read,
            AccessMode::Write => &self.write,
        }
    }
}

impl Minter {
    /// Create a minter for tokens verified at `location`
    pub fn new(secret: Arc<RootSecret>, location: impl Into<String>) -> Self {
        Self {
            secret,
            location: location.into(),
        }
    }

    /// Location tag written into every token
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Root token for `identity`, before any caveat
    pub fn root(&self, identity: &str) -> Result<CapabilityToken> {
        // Validates that the identity can later be carried by an entity caveat
        Caveat::entity(identity)?;
        Ok(CapabilityToken::root(
            &self.secret,
            identity.as_bytes(),
            &self.location,
        ))
    }

    /// Token for `identity` restricted to `mode`
    pub fn mint(&self, identity: &str, mode: AccessMode) -> Result<CapabilityToken> {
        self.mint_with(identity, mode, &[])
    }

    /// Token for `identity` restricted to `mode` and then to `extra`, in order
    pub fn mint_with(
        &self,
        identity: &str,
        mode: AccessMode,
        extra: &[Caveat],
    ) -> Result<CapabilityToken> {
        let root = self.root(identity)?;
        Ok(derive(&root, identity, mode)?.attenuate(extra))
    }

    /// Read and write tokens for `identity` derived from one shared root
    pub fn mint_modes(&self, identity: &str) -> Result<ModeTokens> {
        let root = self.root(identity)?;
        let tokens = ModeTokens {
            read: derive(&root, identity, AccessMode::Read)?,
            write: derive(&root, identity, AccessMode::Write)?,
        };
        debug!(identity, location = %self.location, "minted read and write tokens");
        Ok(tokens)
    }
}

fn derive(root: &CapabilityToken, identity: &str, mode: AccessMode) -> Result<CapabilityToken> {
    Ok(root.attenuate(&[Caveat::entity(identity)?, Caveat::Action(mode)]))
}
