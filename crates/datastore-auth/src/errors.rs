//! Unified error type for token minting, delivery, and verification
//!
//! Every failure in this crate is a deterministic rejection: the same token
//! and request always produce the same error, so nothing here is retried.
//! Each variant carries a stable machine-readable code and a status class.

use serde::{Deserialize, Serialize};

/// How a rejection should be surfaced to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// The request itself was malformed (HTTP 400)
    Malformed,
    /// The request was well formed but is not authorized (HTTP 403)
    Denied,
}

/// Authorization error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AuthError {
    /// Missing or malformed `Authorization: Bearer` header
    #[error("Bad header: {message}")]
    BadHeader {
        /// What was wrong with the header
        message: String,
    },

    /// The bearer token is not validly transport-encoded
    #[error("Bad token encoding: {message}")]
    BadEncoding {
        /// Decoder error
        message: String,
    },

    /// The decoded bytes are not a capability token
    #[error("Bad token format: {message}")]
    BadFormat {
        /// Deserializer error
        message: String,
    },

    /// The MAC chain does not validate against the root secret
    #[error("Invalid token signature")]
    BadSignature,

    /// A caveat does not follow the `<condition> <operator> <argument>` grammar
    #[error("Malformed caveat {caveat:?}: {message}")]
    MalformedCaveat {
        /// Caveat text as found in the token
        caveat: String,
        /// What was wrong with it
        message: String,
    },

    /// A known condition was used with the wrong operator
    #[error("Operator {operator:?} is not valid for condition {condition:?}")]
    OperatorMismatch {
        /// Condition name
        condition: String,
        /// Operator found in the caveat
        operator: String,
    },

    /// A caveat does not hold for the current request
    #[error("Caveat {caveat:?} not satisfied")]
    CaveatUnsatisfied {
        /// Canonical caveat text
        caveat: String,
    },

    /// A `time` caveat has passed its expiry
    #[error("Token expired: caveat {caveat:?} not satisfied")]
    ExpiredToken {
        /// Canonical caveat text
        caveat: String,
    },

    /// The token never names the entity it is bound to
    #[error("Token carries no entity caveat")]
    MissingEntity,

    /// A registration proof did not verify against the claimed identity
    #[error("Invalid identity signature")]
    InvalidIdentitySignature,

    /// Registration input is not validly encoded
    #[error("Invalid encoding of {field}: {message}")]
    InvalidEncoding {
        /// Field that failed to decode
        field: String,
        /// Decoder error
        message: String,
    },

    /// The requester is not an allowed participant
    #[error("Unknown participant {identity}")]
    UnknownParticipant {
        /// Requester identity
        identity: String,
    },

    /// Sealing or opening a token failed
    #[error("Encryption error: {message}")]
    EncryptionError {
        /// What failed
        message: String,
    },
}

impl AuthError {
    /// Create a bad header error
    pub fn bad_header(message: impl Into<String>) -> Self {
        Self::BadHeader {
            message: message.into(),
        }
    }

    /// Create a bad encoding error
    pub fn bad_encoding(message: impl Into<String>) -> Self {
        Self::BadEncoding {
            message: message.into(),
        }
    }

    /// Create a bad format error
    pub fn bad_format(message: impl Into<String>) -> Self {
        Self::BadFormat {
            message: message.into(),
        }
    }

    /// Create a malformed caveat error
    pub fn malformed_caveat(caveat: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedCaveat {
            caveat: caveat.into(),
            message: message.into(),
        }
    }

    /// Create an invalid encoding error
    pub fn invalid_encoding(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an encryption error
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::EncryptionError {
            message: message.into(),
        }
    }

    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadHeader { .. } => "bad_header",
            Self::BadEncoding { .. } => "bad_encoding",
            Self::BadFormat { .. } => "bad_format",
            Self::BadSignature => "bad_signature",
            Self::MalformedCaveat { .. } => "malformed_caveat",
            Self::OperatorMismatch { .. } => "operator_mismatch",
            Self::CaveatUnsatisfied { .. } => "caveat_unsatisfied",
            Self::ExpiredToken { .. } => "expired_token",
            Self::MissingEntity => "missing_entity",
            Self::InvalidIdentitySignature => "invalid_identity_signature",
            Self::InvalidEncoding { .. } => "invalid_encoding",
            Self::UnknownParticipant { .. } => "unknown_participant",
            Self::EncryptionError { .. } => "encryption_error",
        }
    }

    /// Whether this is malformed input or an authorization denial
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::BadHeader { .. }
            | Self::BadEncoding { .. }
            | Self::BadFormat { .. }
            | Self::MalformedCaveat { .. }
            | Self::OperatorMismatch { .. }
            | Self::InvalidEncoding { .. }
            | Self::EncryptionError { .. } => ErrorClass::Malformed,
            Self::BadSignature
            | Self::CaveatUnsatisfied { .. }
            | Self::ExpiredToken { .. }
            | Self::MissingEntity
            | Self::InvalidIdentitySignature
            | Self::UnknownParticipant { .. } => ErrorClass::Denied,
        }
    }
}

/// Standard Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_failures_are_denials() {
        assert_eq!(AuthError::BadSignature.class(), ErrorClass::Denied);
        assert_eq!(AuthError::MissingEntity.class(), ErrorClass::Denied);
        assert_eq!(
            AuthError::InvalidIdentitySignature.class(),
            ErrorClass::Denied
        );
    }

    #[test]
    fn test_decoding_failures_are_malformed() {
        assert_eq!(AuthError::bad_header("x").class(), ErrorClass::Malformed);
        assert_eq!(AuthError::bad_encoding("x").class(), ErrorClass::Malformed);
        assert_eq!(
            AuthError::malformed_caveat("a b", "two tokens").class(),
            ErrorClass::Malformed
        );
    }

    #[test]
    fn test_codes_are_snake_case() {
        let err = AuthError::CaveatUnsatisfied {
            caveat: "action = read".to_string(),
        };
        assert_eq!(err.code(), "caveat_unsatisfied");
        assert_eq!(err.to_string(), "Caveat \"action = read\" not satisfied");
    }
}
