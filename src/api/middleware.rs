//! API Middleware
//!
//! - Request/response logging with a correlation ID per request
//! - Caller identity extraction

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use super::error::ApiError;
use crate::common::logging::{generate_correlation_id, log_api_request, log_api_response};
use crate::types::Identity;

/// Header naming the authenticated caller
pub const CALLER_HEADER: &str = "x-caller-id";

/// Header echoing the request's correlation ID
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Log every request and its response under one correlation ID
pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let correlation_id = generate_correlation_id();
    log_api_request(&method, &path, &correlation_id);

    let start = Instant::now();
    let mut response = next.run(req).await;
    log_api_response(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_millis() as u64,
        &correlation_id,
    );

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

/// Authenticated caller, taken from the `x-caller-id` header set by the
/// fronting proxy
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ApiError::malformed("MISSING_CALLER", format!("{} header required", CALLER_HEADER))
            })?;
        Ok(Caller(Identity::new(value)))
    }
}
