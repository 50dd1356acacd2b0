use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;

use crate::auth::error::AccountError;
use crate::auth::repo_types::User;
use crate::auth::services::AccountService;

/// The caller, if the request carried a bearer token that still resolves to
/// an account. Bad tokens never reject the request.
pub struct MaybeAuthUser(pub Option<User>);

/// The caller; fails the operation when there is none.
pub struct AuthUser(pub User);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    AccountService: FromRef<S>,
{
    type Rejection = AccountError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeAuthUser(None));
        };

        let service = AccountService::from_ref(state);
        let user = service.authenticate(token).await?;
        if user.is_none() {
            debug!("bearer token did not resolve, continuing unauthenticated");
        }
        Ok(MaybeAuthUser(user))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AccountService: FromRef<S>,
{
    type Rejection = AccountError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let MaybeAuthUser(user) = MaybeAuthUser::from_request_parts(parts, state).await?;
        user.map(AuthUser).ok_or(AccountError::Authentication)
    }
}
