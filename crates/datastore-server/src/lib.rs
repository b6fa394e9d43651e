//! HTTP surface of the datastore authorization layer
//!
//! Exposes registration and server information publicly and guards every
//! protected route with the capability gate from `datastore-auth`.

/// Server configuration
pub mod config;
/// HTTP error mapping
pub mod error;
/// Capability layer and caller extractor
pub mod middleware;
/// Router assembly
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;
pub use middleware::{require_capability, Caller};
pub use server::{AppState, InformationResponse, Server, ServerInfo, SessionResponse};
