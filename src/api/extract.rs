//! Request-local identity extraction. User identity itself is issued by
//! an external auth provider (out of scope for this crate); the
//! coordinator only trusts whatever identity the gateway in front of it
//! has already attached to the request.

use crate::error::CoordinatorError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = CoordinatorError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoordinatorError::Unauthorized("missing user identity".into()))?;
        Ok(UserId(user_id.to_string()))
    }
}
