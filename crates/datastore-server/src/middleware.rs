//! Capability layer for protected routes
//!
//! Runs after routing so matched path parameters are available to the
//! `resources` caveat. A request that passes gets its bound [`Identity`]
//! attached as a request extension; handlers read it with [`Caller`].

use crate::error::ApiError;
use crate::server::AppState;
use axum::async_trait;
use axum::extract::{FromRequestParts, RawPathParams, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use datastore_auth::{Identity, RequestContext};

/// Verify the bearer token of `request` before handing it to `next`
pub async fn require_capability(
    State(state): State<AppState>,
    params: Option<RawPathParams>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut context = request_context(&request, params.as_ref());
    match state.gate.authorize(&mut context) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(error) => ApiError::from(error).into_response(),
    }
}

fn request_context(request: &Request, params: Option<&RawPathParams>) -> RequestContext {
    let mut context = RequestContext::new(request.method().as_str(), request.uri().path());
    for (name, value) in request.headers() {
        // Non-UTF-8 values can't carry a bearer token
        if let Ok(value) = value.to_str() {
            context = context.with_header(name.as_str(), value);
        }
    }
    if let Some(params) = params {
        for (name, value) in params {
            context = context.with_path_param(name, value);
        }
    }
    context
}

/// Identity bound by the capability layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Caller)
            .ok_or(ApiError::Unauthenticated)
    }
}
