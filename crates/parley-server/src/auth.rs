//! Caller identity for REST handlers.
//!
//! Sessions are issued by an upstream account service; requests arrive with
//! `Authorization: Bearer <userId>` and the id must belong to a stored user.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use parley_shared::types::UserId;

use crate::api::AppState;
use crate::error::ServerError;

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = bearer_user_id(parts)?;

        let known = state
            .storage
            .run("user_exists", move |db| db.user_exists(user_id))
            .await?;
        if !known {
            return Err(ServerError::Unauthorized("Unknown user".into()));
        }

        Ok(CurrentUser(user_id))
    }
}

fn bearer_user_id(parts: &Parts) -> Result<UserId, ServerError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Unauthorized("Missing Authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServerError::Unauthorized("Expected a Bearer token".into()))?;

    token
        .parse()
        .map_err(|_| ServerError::Unauthorized("Malformed session token".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/messages/users");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_parsing() {
        let id = UserId::new();
        assert_eq!(bearer_user_id(&parts(Some(&format!("Bearer {id}")))).unwrap(), id);
        assert!(bearer_user_id(&parts(None)).is_err());
        assert!(bearer_user_id(&parts(Some("Basic abc"))).is_err());
        assert!(bearer_user_id(&parts(Some("Bearer not-a-uuid"))).is_err());
    }
}
