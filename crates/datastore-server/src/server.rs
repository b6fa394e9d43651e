//! Router assembly and serving
//!
//! Public routes (`/register`, `/information`) sit beside protected routes
//! that only run after the capability layer has bound an identity.

use crate::config::{ConfigError, ServerConfig};
use crate::error::ApiError;
use crate::middleware::{require_capability, Caller};
use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post, MethodRouter};
use axum::{middleware, Json, Router};
use datastore_auth::{Gate, Minter, Registrar, RegistrationRequest, RegistrationResponse};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Preflight cache lifetime advertised to browsers
const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Shared state for handlers and the capability layer
#[derive(Debug, Clone)]
pub struct AppState {
    /// Verification gate
    pub gate: Arc<Gate>,
    /// Registration handler
    pub registrar: Arc<Registrar>,
}

impl AppState {
    /// Bundle a gate and a registrar
    pub fn new(gate: Gate, registrar: Registrar) -> Self {
        Self {
            gate: Arc::new(gate),
            registrar: Arc::new(registrar),
        }
    }
}

/// Server key information published at `/information`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server account number
    pub account_number: String,
    /// Hex X25519 key that seals registration tokens
    pub enc_pub_key: String,
}

/// Body of `GET /information`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformationResponse {
    /// Server key information
    pub server: ServerInfo,
}

/// Body of `GET /session`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Identity bound from the presented token
    pub identity: String,
}

/// HTTP server builder
#[derive(Debug)]
pub struct Server {
    state: AppState,
    protected: Router<AppState>,
    has_protected: bool,
    request_tracing: bool,
}

impl Server {
    /// Create a server with only the public routes
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            protected: Router::new(),
            has_protected: false,
            request_tracing: false,
        }
    }

    /// Build the server described by a validated configuration
    ///
    /// Includes the protected `/session` route, which echoes the caller's
    /// bound identity.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let secret = Arc::new(config.root_secret()?);
        let account = Arc::new(config.account_keys()?);
        info!(
            account_number = %account.account_number(),
            endpoint = %config.server.endpoint,
            "server account loaded"
        );

        let minter = Minter::new(secret.clone(), config.server.endpoint.clone());
        let mut registrar = Registrar::new(minter, account);
        if let Some(participants) = config.participants()? {
            info!(count = participants.len(), "registration restricted to participants");
            registrar = registrar.with_participants(participants);
        }

        Ok(Self::new(AppState::new(Gate::new(secret), registrar))
            .protected_route("/session", get(session))
            .with_request_tracing(config.server.tracing))
    }

    /// Add a route that requires a valid capability token
    pub fn protected_route(mut self, path: &str, route: MethodRouter<AppState>) -> Self {
        self.protected = self.protected.route(path, route);
        self.has_protected = true;
        self
    }

    /// Trace every request with `tower-http`
    pub fn with_request_tracing(mut self, enabled: bool) -> Self {
        self.request_tracing = enabled;
        self
    }

    /// Assemble the router
    pub fn into_router(self) -> Router {
        let mut router = Router::new()
            .route("/register", post(register))
            .route("/information", get(information));

        // route_layer on a router without routes panics
        if self.has_protected {
            let gate = middleware::from_fn_with_state(self.state.clone(), require_capability);
            router = router.merge(self.protected.route_layer(gate));
        }

        let cors = CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::HEAD,
            ])
            .allow_headers(Any)
            .allow_origin(Any)
            .max_age(CORS_MAX_AGE);
        router = router.layer(cors);

        if self.request_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router.with_state(self.state)
    }

    /// Serve on `addr` until `shutdown` resolves
    pub async fn run<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::InvalidBody(rejection.body_text()))?;
    Ok(Json(state.registrar.register(&request)?))
}

async fn information(State(state): State<AppState>) -> Json<InformationResponse> {
    let account = state.registrar.server();
    Json(InformationResponse {
        server: ServerInfo {
            account_number: account.account_number().to_string(),
            enc_pub_key: account.encryption_public_key().to_hex(),
        },
    })
}

async fn session(Caller(identity): Caller) -> Json<SessionResponse> {
    Json(SessionResponse {
        identity: identity.into_inner(),
    })
}
