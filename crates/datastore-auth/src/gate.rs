//! Per-request token verification gate
//!
//! A protected request moves through these stages, stopping at the first
//! failure:
//!
//! ```text
//! Start ──header──▶ Decoded ──MAC chain──▶ SignatureVerified ──caveats──▶ Authorized
//!   │                 │                       │
//!   └▶ BadHeader      └▶ BadEncoding          └▶ BadSignature
//!                        BadFormat               MalformedCaveat | OperatorMismatch
//!                                                CaveatUnsatisfied | ExpiredToken
//!                                                MissingEntity
//! ```
//!
//! Caveats are evaluated strictly in append order and evaluation stops at
//! the first one that fails. Verification is pure computation over the root
//! secret and the token bytes; the gate keeps no per-token state.

use crate::caveat::Caveat;
use crate::context::{Identity, RequestContext};
use crate::secret::RootSecret;
use crate::token::{CapabilityToken, VerifiedToken};
use crate::{AuthError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Auth scheme of the `Authorization` header, matched case-insensitively
pub const BEARER_SCHEME: &str = "Bearer";

/// Source of the current UTC time in Unix seconds
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current Unix timestamp
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock stopped at a fixed instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

/// Stage of the gate a request is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    /// Looking for the bearer header
    Start,
    /// Token bytes decoded
    Decoded,
    /// MAC chain checked
    SignatureVerified,
    /// Walking the caveats
    EvaluatingCaveats,
}

impl GateStage {
    /// Stage name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStage::Start => "start",
            GateStage::Decoded => "decoded",
            GateStage::SignatureVerified => "signature_verified",
            GateStage::EvaluatingCaveats => "evaluating_caveats",
        }
    }

    /// Stage at which `error` ends a request
    pub fn of(error: &AuthError) -> Self {
        match error {
            AuthError::BadHeader { .. } => GateStage::Start,
            AuthError::BadEncoding { .. } | AuthError::BadFormat { .. } => GateStage::Decoded,
            AuthError::BadSignature => GateStage::SignatureVerified,
            _ => GateStage::EvaluatingCaveats,
        }
    }
}

/// Verifies bearer tokens and evaluates their caveats
#[derive(Debug, Clone)]
pub struct Gate {
    secret: Arc<RootSecret>,
    clock: Arc<dyn Clock>,
}

impl Gate {
    /// Create a gate using the wall clock
    pub fn new(secret: Arc<RootSecret>) -> Self {
        Self {
            secret,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for `time` caveats
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run a request through every stage
    ///
    /// On success the bound identity is written into `request` and returned.
    pub fn authorize(&self, request: &mut RequestContext) -> Result<Identity> {
        let outcome = self.run(request);
        match &outcome {
            Ok(identity) => {
                debug!(
                    method = request.method(),
                    path = request.path(),
                    identity = identity.as_str(),
                    "request authorized"
                );
                request.bind_identity(identity.clone());
            }
            Err(error) => warn!(
                method = request.method(),
                path = request.path(),
                stage = GateStage::of(error).as_str(),
                code = error.code(),
                "request denied: {error}"
            ),
        }
        outcome
    }

    fn run(&self, request: &RequestContext) -> Result<Identity> {
        let token = decode(bearer_token(request)?)?;
        let verified = self.verify(token)?;
        self.evaluate(&verified, request)
    }

    /// Check a decoded token's MAC chain
    pub fn verify(&self, token: CapabilityToken) -> Result<VerifiedToken> {
        let verified = token.verify(&self.secret)?;
        debug!(
            location = verified.location(),
            stage = GateStage::SignatureVerified.as_str(),
            "token signature verified"
        );
        Ok(verified)
    }

    /// Evaluate every caveat of a verified token against `request`
    pub fn evaluate(&self, token: &VerifiedToken, request: &RequestContext) -> Result<Identity> {
        let now = self.clock.now();
        let mut entity: Option<String> = None;

        for (position, caveat) in token.caveats().enumerate() {
            let caveat = caveat?;
            if let Caveat::Entity(identity) = &caveat {
                match &entity {
                    Some(bound) if bound != identity => {
                        return Err(AuthError::CaveatUnsatisfied {
                            caveat: caveat.encode(),
                        });
                    }
                    _ => entity = Some(identity.clone()),
                }
            }
            caveat.check(request, now)?;
            debug!(position, caveat = %caveat, "caveat satisfied");
        }

        entity.map(Identity::new).ok_or(AuthError::MissingEntity)
    }
}

/// Extract the bearer token from the `Authorization` header
pub fn bearer_token(request: &RequestContext) -> Result<&str> {
    let header = request
        .header("authorization")
        .ok_or_else(|| AuthError::bad_header("missing Authorization header"))?;
    let (scheme, token) = header
        .trim_start()
        .split_once(' ')
        .unwrap_or((header.trim(), ""));
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(AuthError::bad_header("expected Bearer scheme"));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::bad_header("empty bearer token"));
    }
    Ok(token)
}

fn decode(encoded: &str) -> Result<CapabilityToken> {
    let token = CapabilityToken::from_hex(encoded)?;
    debug!(
        caveats = token.caveat_count(),
        stage = GateStage::Decoded.as_str(),
        "token decoded"
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caveat::AccessMode;
    use crate::minter::Minter;
    use assert_matches::assert_matches;

    const NOW: i64 = 1_700_000_000;

    fn secret() -> Arc<RootSecret> {
        Arc::new(RootSecret::new(b"ROOT KEY".to_vec()).unwrap())
    }

    fn gate() -> Gate {
        Gate::new(secret()).with_clock(Arc::new(FixedClock(NOW)))
    }

    fn minter() -> Minter {
        Minter::new(secret(), "svc.example")
    }

    fn request(method: &str, path: &str, token: &CapabilityToken) -> RequestContext {
        RequestContext::new(method, path)
            .with_header("Authorization", format!("Bearer {}", token.to_hex().unwrap()))
    }

    #[test]
    fn test_end_to_end_write_token() {
        let token = minter().mint("account1", AccessMode::Write).unwrap();

        let mut put = request("PUT", "/poi_rating/123", &token).with_path_param("poi_id", "123");
        let identity = gate().authorize(&mut put).unwrap();
        assert_eq!(identity.as_str(), "account1");
        assert_eq!(put.identity(), Some(&Identity::new("account1")));

        let mut get = request("GET", "/poi_rating/123", &token).with_path_param("poi_id", "123");
        assert_matches!(
            gate().authorize(&mut get),
            Err(AuthError::CaveatUnsatisfied { caveat }) if caveat == "action = write"
        );
        assert_eq!(get.identity(), None);
    }

    #[test]
    fn test_header_failures() {
        let mut missing = RequestContext::new("GET", "/poi_rating");
        assert_matches!(gate().authorize(&mut missing), Err(AuthError::BadHeader { .. }));

        let mut basic = RequestContext::new("GET", "/poi_rating").with_header("Authorization", "Basic abc");
        assert_matches!(gate().authorize(&mut basic), Err(AuthError::BadHeader { .. }));

        let mut empty = RequestContext::new("GET", "/poi_rating").with_header("Authorization", "Bearer ");
        assert_matches!(gate().authorize(&mut empty), Err(AuthError::BadHeader { .. }));

        let mut glued =
            RequestContext::new("GET", "/poi_rating").with_header("Authorization", "Bearer0102");
        assert_matches!(gate().authorize(&mut glued), Err(AuthError::BadHeader { .. }));
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        for scheme in ["bearer", "BEARER", "Bearer"] {
            let request = RequestContext::new("GET", "/poi_rating")
                .with_header("Authorization", format!("{scheme} 0102"));
            assert_eq!(bearer_token(&request).unwrap(), "0102");
        }
    }

    #[test]
    fn test_decoding_failures() {
        let mut not_hex =
            RequestContext::new("GET", "/poi_rating").with_header("Authorization", "Bearer zz");
        assert_matches!(gate().authorize(&mut not_hex), Err(AuthError::BadEncoding { .. }));

        let mut garbage =
            RequestContext::new("GET", "/poi_rating").with_header("Authorization", "Bearer 0102");
        assert_matches!(gate().authorize(&mut garbage), Err(AuthError::BadFormat { .. }));
    }

    #[test]
    fn test_foreign_secret_is_rejected() {
        let foreign = Minter::new(
            Arc::new(RootSecret::new(b"OTHER".to_vec()).unwrap()),
            "svc.example",
        );
        let token = foreign.mint("account1", AccessMode::Read).unwrap();
        let mut get = request("GET", "/poi_rating", &token);
        assert_matches!(gate().authorize(&mut get), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_operator_mismatch_under_valid_signature() {
        let token = minter()
            .root("account1")
            .unwrap()
            .with_caveat(&Caveat::Entity("account1".to_string()))
            .with_raw_caveat("action in write");
        let mut post = request("POST", "/symptom-daily-reports", &token);
        assert_matches!(
            gate().authorize(&mut post),
            Err(AuthError::OperatorMismatch { .. })
        );
    }

    #[test]
    fn test_malformed_caveat_under_valid_signature() {
        let token = minter()
            .mint("account1", AccessMode::Read)
            .unwrap()
            .with_raw_caveat("resources poi_rating");
        let mut get = request("GET", "/poi_rating", &token);
        assert_matches!(
            gate().authorize(&mut get),
            Err(AuthError::MalformedCaveat { .. })
        );
    }

    #[test]
    fn test_evaluation_stops_at_first_failure() {
        // The action caveat fails first, so the malformed caveat after it is never parsed
        let token = minter()
            .mint("account1", AccessMode::Read)
            .unwrap()
            .with_raw_caveat("not a caveat at all");
        let mut put = request("PUT", "/poi_rating", &token);
        assert_matches!(
            gate().authorize(&mut put),
            Err(AuthError::CaveatUnsatisfied { .. })
        );
    }

    #[test]
    fn test_expiry_is_strict() {
        let base = minter().mint("account1", AccessMode::Read).unwrap();

        let live = base.with_caveat(&Caveat::expires_at(NOW + 1));
        assert!(gate().authorize(&mut request("GET", "/poi_rating", &live)).is_ok());

        let boundary = base.with_caveat(&Caveat::expires_at(NOW));
        assert_matches!(
            gate().authorize(&mut request("GET", "/poi_rating", &boundary)),
            Err(AuthError::ExpiredToken { .. })
        );
    }

    #[test]
    fn test_resource_scoping() {
        let scope = [Caveat::resources(["poi_rating"]).unwrap()];
        let read = minter().mint_with("account1", AccessMode::Read, &scope).unwrap();
        let write = minter().mint_with("account1", AccessMode::Write, &scope).unwrap();

        let mut get = request("GET", "/poi_rating/42", &read).with_path_param("poi_id", "42");
        assert!(gate().authorize(&mut get).is_ok());

        let mut put = request("PUT", "/poi_rating/42", &write).with_path_param("poi_id", "42");
        assert!(gate().authorize(&mut put).is_ok());

        let mut post = request("POST", "/symptom-daily-reports", &write);
        assert_matches!(
            gate().authorize(&mut post),
            Err(AuthError::CaveatUnsatisfied { caveat }) if caveat == "resources in poi_rating"
        );
    }

    #[test]
    fn test_entity_is_mandatory() {
        let token = minter()
            .root("account1")
            .unwrap()
            .with_caveat(&Caveat::Action(AccessMode::Read));
        let mut get = request("GET", "/poi_rating", &token);
        assert_matches!(gate().authorize(&mut get), Err(AuthError::MissingEntity));
    }

    #[test]
    fn test_conflicting_entities_are_denied() {
        let token = minter()
            .mint("account1", AccessMode::Read)
            .unwrap()
            .with_caveat(&Caveat::Entity("account2".to_string()));
        let mut get = request("GET", "/poi_rating", &token);
        assert_matches!(
            gate().authorize(&mut get),
            Err(AuthError::CaveatUnsatisfied { caveat }) if caveat == "entity = account2"
        );
    }

    #[test]
    fn test_repeated_entity_is_allowed() {
        let token = minter()
            .mint("account1", AccessMode::Read)
            .unwrap()
            .with_caveat(&Caveat::Entity("account1".to_string()));
        let mut get = request("GET", "/poi_rating", &token);
        assert_eq!(gate().authorize(&mut get).unwrap().as_str(), "account1");
    }

    #[test]
    fn test_stage_of_errors() {
        assert_eq!(GateStage::of(&AuthError::bad_header("x")), GateStage::Start);
        assert_eq!(GateStage::of(&AuthError::bad_format("x")), GateStage::Decoded);
        assert_eq!(
            GateStage::of(&AuthError::BadSignature),
            GateStage::SignatureVerified
        );
        assert_eq!(
            GateStage::of(&AuthError::MissingEntity),
            GateStage::EvaluatingCaveats
        );
    }
}
