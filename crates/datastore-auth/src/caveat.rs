//! Caveat grammar and typed evaluators
//!
//! A caveat travels inside a token as the text `"<condition> <operator> <argument>"`.
//! Only four conditions exist and each has exactly one operator:
//!
//! | condition   | operator | argument                                  |
//! |-------------|----------|-------------------------------------------|
//! | `entity`    | `=`      | bound identity string                     |
//! | `action`    | `=`      | `read` or `write`                         |
//! | `resources` | `in`     | comma-separated resource-category names   |
//! | `time`      | `<`      | expiry as an integer Unix timestamp       |
//!
//! Parsed caveats are a closed enum so that every condition is matched
//! exhaustively when a request is evaluated.

use crate::context::RequestContext;
use crate::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access class of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// GET and HEAD
    Read,
    /// POST, PUT, PATCH and DELETE
    Write,
}

impl AccessMode {
    /// Both modes, in the order tokens are minted at registration
    pub const ALL: [AccessMode; 2] = [AccessMode::Read, AccessMode::Write];

    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
        }
    }

    /// Access class of an HTTP method, `None` for methods outside both classes
    pub fn for_method(method: &str) -> Option<Self> {
        match method {
            "GET" | "HEAD" => Some(AccessMode::Read),
            "POST" | "PUT" | "PATCH" | "DELETE" => Some(AccessMode::Write),
            _ => None,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(AccessMode::Read),
            "write" => Ok(AccessMode::Write),
            other => Err(AuthError::malformed_caveat(
                format!("action = {other}"),
                "action must be read or write",
            )),
        }
    }
}

/// Caveat condition names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// `entity =`
    Entity,
    /// `action =`
    Action,
    /// `resources in`
    Resources,
    /// `time <`
    Time,
}

impl Condition {
    /// Condition keyword
    pub fn name(&self) -> &'static str {
        match self {
            Condition::Entity => "entity",
            Condition::Action => "action",
            Condition::Resources => "resources",
            Condition::Time => "time",
        }
    }

    /// The only operator accepted for this condition
    pub fn operator(&self) -> &'static str {
        match self {
            Condition::Entity | Condition::Action => "=",
            Condition::Resources => "in",
            Condition::Time => "<",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "entity" => Some(Condition::Entity),
            "action" => Some(Condition::Action),
            "resources" => Some(Condition::Resources),
            "time" => Some(Condition::Time),
            _ => None,
        }
    }
}

/// A single restriction on what a token authorizes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Caveat {
    /// Binds the request to this identity
    Entity(String),
    /// Restricts the request method to one access class
    Action(AccessMode),
    /// Restricts the final path segment to one of these names
    Resources(Vec<String>),
    /// Valid strictly before this Unix timestamp
    Time(i64),
}

impl Caveat {
    /// Build an `entity` caveat, rejecting identities the grammar cannot carry
    pub fn entity(identity: impl Into<String>) -> Result<Self> {
        let identity = identity.into();
        check_argument(Condition::Entity, &identity)?;
        Ok(Caveat::Entity(identity))
    }

    /// Build a `resources` caveat from resource-category names
    pub fn resources<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(AuthError::malformed_caveat(
                "resources in",
                "resource set must not be empty",
            ));
        }
        for name in &names {
            check_argument(Condition::Resources, name)?;
            if name.contains(',') {
                return Err(AuthError::malformed_caveat(
                    format!("resources in {name}"),
                    "resource names must not contain commas",
                ));
            }
        }
        Ok(Caveat::Resources(names))
    }

    /// Build a `time` caveat expiring at `expires_at` (Unix seconds)
    pub fn expires_at(expires_at: i64) -> Self {
        Caveat::Time(expires_at)
    }

    /// Condition of this caveat
    pub fn condition(&self) -> Condition {
        match self {
            Caveat::Entity(_) => Condition::Entity,
            Caveat::Action(_) => Condition::Action,
            Caveat::Resources(_) => Condition::Resources,
            Caveat::Time(_) => Condition::Time,
        }
    }

    /// Parse caveat text
    pub fn parse(text: &str) -> Result<Self> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let [condition, operator, argument] = tokens.as_slice() else {
            return Err(AuthError::malformed_caveat(
                text,
                format!("expected 3 tokens, found {}", tokens.len()),
            ));
        };

        let condition = Condition::from_name(condition).ok_or_else(|| {
            AuthError::malformed_caveat(text, format!("unknown condition {condition:?}"))
        })?;
        if *operator != condition.operator() {
            return Err(AuthError::OperatorMismatch {
                condition: condition.name().to_string(),
                operator: (*operator).to_string(),
            });
        }

        match condition {
            Condition::Entity => Ok(Caveat::Entity((*argument).to_string())),
            Condition::Action => argument
                .parse::<AccessMode>()
                .map(Caveat::Action)
                .map_err(|_| AuthError::malformed_caveat(text, "action must be read or write")),
            Condition::Resources => {
                let names: Vec<String> = argument
                    .split(',')
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    return Err(AuthError::malformed_caveat(text, "empty resource set"));
                }
                Ok(Caveat::Resources(names))
            }
            Condition::Time => argument
                .parse::<i64>()
                .map(Caveat::Time)
                .map_err(|e| AuthError::malformed_caveat(text, format!("invalid expiry: {e}"))),
        }
    }

    /// Parse caveat bytes as stored in a token
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            AuthError::malformed_caveat(String::from_utf8_lossy(bytes), e.to_string())
        })?;
        Self::parse(text)
    }

    /// Canonical caveat text
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Check this caveat against a request at time `now` (Unix seconds)
    ///
    /// `entity` always holds here; binding and conflicts between several
    /// `entity` caveats are resolved by the gate.
    pub fn check(&self, request: &RequestContext, now: i64) -> Result<()> {
        let satisfied = match self {
            Caveat::Entity(_) => true,
            Caveat::Action(mode) => AccessMode::for_method(request.method()) == Some(*mode),
            Caveat::Resources(allowed) => request
                .target_resource()
                .is_some_and(|target| allowed.iter().any(|name| *name == *target)),
            Caveat::Time(expires_at) => {
                if now < *expires_at {
                    true
                } else {
                    return Err(AuthError::ExpiredToken {
                        caveat: self.encode(),
                    });
                }
            }
        };

        if satisfied {
            Ok(())
        } else {
            Err(AuthError::CaveatUnsatisfied {
                caveat: self.encode(),
            })
        }
    }
}

impl fmt::Display for Caveat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let condition = self.condition();
        write!(f, "{} {} ", condition.name(), condition.operator())?;
        match self {
            Caveat::Entity(identity) => f.write_str(identity),
            Caveat::Action(mode) => f.write_str(mode.as_str()),
            Caveat::Resources(names) => f.write_str(&names.join(",")),
            Caveat::Time(expires_at) => write!(f, "{expires_at}"),
        }
    }
}

impl FromStr for Caveat {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        Caveat::parse(s)
    }
}

fn check_argument(condition: Condition, argument: &str) -> Result<()> {
    if argument.is_empty() || argument.chars().any(char::is_whitespace) {
        return Err(AuthError::malformed_caveat(
            format!("{} {} {argument}", condition.name(), condition.operator()),
            "argument must be a single non-empty token",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_each_condition() {
        assert_eq!(
            Caveat::parse("entity = account1").unwrap(),
            Caveat::Entity("account1".to_string())
        );
        assert_eq!(
            Caveat::parse("action = write").unwrap(),
            Caveat::Action(AccessMode::Write)
        );
        assert_eq!(
            Caveat::parse("resources in poi_rating,report-items").unwrap(),
            Caveat::Resources(vec!["poi_rating".to_string(), "report-items".to_string()])
        );
        assert_eq!(
            Caveat::parse("time < 1700000000").unwrap(),
            Caveat::Time(1_700_000_000)
        );
    }

    #[test]
    fn test_parse_tolerates_extra_whitespace() {
        assert_eq!(
            Caveat::parse("  action   =\tread ").unwrap(),
            Caveat::Action(AccessMode::Read)
        );
    }

    #[test]
    fn test_wrong_token_count_is_malformed() {
        assert_matches!(
            Caveat::parse("action write"),
            Err(AuthError::MalformedCaveat { .. })
        );
        assert_matches!(
            Caveat::parse("entity = two words"),
            Err(AuthError::MalformedCaveat { .. })
        );
        assert_matches!(Caveat::parse(""), Err(AuthError::MalformedCaveat { .. }));
    }

    #[test]
    fn test_operator_is_fixed_per_condition() {
        assert_matches!(
            Caveat::parse("action in write"),
            Err(AuthError::OperatorMismatch { condition, operator })
                if condition == "action" && operator == "in"
        );
        assert_matches!(
            Caveat::parse("resources = poi_rating"),
            Err(AuthError::OperatorMismatch { .. })
        );
        assert_matches!(
            Caveat::parse("time <= 10"),
            Err(AuthError::OperatorMismatch { .. })
        );
    }

    #[test]
    fn test_unknown_condition_and_bad_arguments() {
        assert_matches!(
            Caveat::parse("ip = 10.0.0.1"),
            Err(AuthError::MalformedCaveat { .. })
        );
        assert_matches!(
            Caveat::parse("action = execute"),
            Err(AuthError::MalformedCaveat { .. })
        );
        assert_matches!(
            Caveat::parse("time < tomorrow"),
            Err(AuthError::MalformedCaveat { .. })
        );
        assert_matches!(
            Caveat::parse("resources in ,,"),
            Err(AuthError::MalformedCaveat { .. })
        );
        assert_matches!(
            Caveat::from_bytes(&[0xff, 0xfe]),
            Err(AuthError::MalformedCaveat { .. })
        );
    }

    #[test]
    fn test_encode_is_canonical() {
        let caveat = Caveat::resources(["poi_rating", "symptom-daily-reports"]).unwrap();
        assert_eq!(
            caveat.encode(),
            "resources in poi_rating,symptom-daily-reports"
        );
        assert_eq!(Caveat::expires_at(42).encode(), "time < 42");
        assert_eq!(Caveat::Action(AccessMode::Read).encode(), "action = read");
    }

    #[test]
    fn test_constructors_reject_unencodable_arguments() {
        assert!(Caveat::entity("").is_err());
        assert!(Caveat::entity("two words").is_err());
        assert!(Caveat::resources(Vec::<String>::new()).is_err());
        assert!(Caveat::resources(["a,b"]).is_err());
    }

    #[test]
    fn test_method_access_classes() {
        for method in ["POST", "PUT", "PATCH", "DELETE"] {
            assert_eq!(AccessMode::for_method(method), Some(AccessMode::Write));
        }
        for method in ["GET", "HEAD"] {
            assert_eq!(AccessMode::for_method(method), Some(AccessMode::Read));
        }
        assert_eq!(AccessMode::for_method("OPTIONS"), None);
    }

    #[test]
    fn test_time_is_strict() {
        let request = RequestContext::new("GET", "/poi_rating");
        let caveat = Caveat::expires_at(100);
        assert!(caveat.check(&request, 99).is_ok());
        assert_matches!(
            caveat.check(&request, 100),
            Err(AuthError::ExpiredToken { .. })
        );
        assert_matches!(
            caveat.check(&request, 101),
            Err(AuthError::ExpiredToken { .. })
        );
    }

    #[test]
    fn test_action_rejects_unclassified_methods() {
        let request = RequestContext::new("OPTIONS", "/poi_rating");
        assert_matches!(
            Caveat::Action(AccessMode::Read).check(&request, 0),
            Err(AuthError::CaveatUnsatisfied { .. })
        );
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    fn arb_caveat() -> impl Strategy<Value = Caveat> {
        prop_oneof![
            "[A-Za-z0-9_.@-]{1,40}".prop_map(Caveat::Entity),
            prop_oneof![Just(AccessMode::Read), Just(AccessMode::Write)].prop_map(Caveat::Action),
            prop::collection::vec("[a-z_-]{1,20}", 1..5).prop_map(Caveat::Resources),
            any::<i64>().prop_map(Caveat::Time),
        ]
    }

    proptest! {
        #[test]
        fn encoded_caveats_parse_back(caveat in arb_caveat()) {
            prop_assert_eq!(Caveat::parse(&caveat.encode()).unwrap(), caveat);
        }

        #[test]
        fn parse_never_panics(text in "\\PC{0,64}") {
            let _ = Caveat::parse(&text);
        }
    }
}
