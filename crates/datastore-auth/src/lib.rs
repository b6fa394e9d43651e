//! Capability-token authorization for the datastore
//!
//! Tokens are stateless chained-MAC credentials bound to a server root
//! secret. Registration verifies a requester's self-signed proof, mints one
//! read and one write token, and seals each to the requester's encryption
//! key. Every protected request then passes through the [`Gate`], which
//! recomputes the MAC chain and evaluates the token's caveats in order.

/// Account key material (signing and encryption keys from one seed)
pub mod account;
/// Caveat grammar and typed evaluators
pub mod caveat;
/// Request view seen by the gate
pub mod context;
/// Unified error type
pub mod errors;
/// Per-request verification gate
pub mod gate;
/// Self-certifying identities and registration proofs
pub mod identity;
/// Token minting
pub mod minter;
/// Registration flow
pub mod registration;
/// Authenticated public-key encryption for token delivery
pub mod sealing;
/// Root secret
pub mod secret;
/// Chained-MAC capability tokens
pub mod token;

pub use account::AccountKeys;
pub use caveat::{AccessMode, Caveat, Condition};
pub use context::{Identity, RequestContext};
pub use errors::{AuthError, ErrorClass, Result};
pub use gate::{bearer_token, Clock, FixedClock, Gate, GateStage, SystemClock};
pub use identity::{registration_message, verify_identity, AccountNumber};
pub use minter::{Minter, ModeTokens};
pub use registration::{Registrar, RegistrationRequest, RegistrationResponse};
pub use sealing::{open, open_token, seal, seal_token, BoxPublicKey, BoxSecretKey};
pub use secret::RootSecret;
pub use token::{CapabilityToken, VerifiedToken};
