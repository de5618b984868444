use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use uuid::Uuid;

/// Metadata header carrying the id of the user making the request.
pub const CALLER_ID_HEADER: &str = "x-user-id";

/// Id of the requesting user, taken from request metadata.
pub struct CallerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CALLER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "user id is required".to_string()))?;

        let id = Uuid::parse_str(raw)
            .map_err(|_| (StatusCode::BAD_REQUEST, "invalid user id".to_string()))?;
        Ok(CallerId(id))
    }
}
