use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

/// Header carrying the authenticated caller set by the upstream gateway.
const CALLER_HEADER: &str = "x-user-id";

/// Authenticated caller identity for a request.
///
/// The gateway in front of this service authenticates every request and
/// forwards the caller as [`CALLER_HEADER`]. Authorization decisions use only
/// this identity; identifiers inside request bodies are never trusted.
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity(pub Uuid);

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {CALLER_HEADER} header")))?;

        let id = Uuid::parse_str(value.trim())
            .map_err(|_| AppError::Unauthorized(format!("malformed {CALLER_HEADER} header")))?;

        Ok(Self(id))
    }
}
