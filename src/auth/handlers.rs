use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AccessTokenResponse, ChangePasswordRequest, CurrentUserResponse, LoginRequest,
            RegisterRequest,
        },
        error::{AccountError, AccountResult},
        extractors::{AuthUser, MaybeAuthUser},
        services::AccountService,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/change-password", post(change_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn refuse_if_signed_in(caller: &MaybeAuthUser) -> AccountResult<()> {
    match caller.0 {
        Some(_) => Err(AccountError::State("already logged in")),
        None => Ok(()),
    }
}

#[instrument(skip(service, caller, payload))]
pub async fn register(
    State(service): State<AccountService>,
    caller: MaybeAuthUser,
    Json(payload): Json<RegisterRequest>,
) -> AccountResult<(StatusCode, Json<AccessTokenResponse>)> {
    refuse_if_signed_in(&caller)?;
    let access_token = service
        .register(&payload.username, &payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(AccessTokenResponse { access_token })))
}

#[instrument(skip(service, caller, payload))]
pub async fn login(
    State(service): State<AccountService>,
    caller: MaybeAuthUser,
    Json(payload): Json<LoginRequest>,
) -> AccountResult<Json<AccessTokenResponse>> {
    refuse_if_signed_in(&caller)?;
    let access_token = service
        .login(&payload.username_or_email, &payload.password)
        .await?;
    Ok(Json(AccessTokenResponse { access_token }))
}

#[instrument(skip(service, user), fields(user_id = %user.id))]
pub async fn logout(
    State(service): State<AccountService>,
    AuthUser(user): AuthUser,
) -> AccountResult<StatusCode> {
    service.logout(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(service, user, payload), fields(user_id = %user.id))]
pub async fn change_password(
    State(service): State<AccountService>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AccountResult<Json<AccessTokenResponse>> {
    let access_token = service
        .change_password(user.id, &payload.old_password, &payload.new_password)
        .await?;
    Ok(Json(AccessTokenResponse { access_token }))
}

#[instrument(skip(service, user), fields(user_id = %user.id))]
pub async fn get_me(
    State(service): State<AccountService>,
    AuthUser(user): AuthUser,
) -> AccountResult<Json<CurrentUserResponse>> {
    let user = service.current_user(user.id).await?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_user_response_serialization() {
        let response = CurrentUserResponse {
            id: uuid::Uuid::new_v4(),
            name: "alice_01".to_string(),
            email: "alice@example.com".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("alice@example.com"));
        assert!(json.contains("\"name\":\"alice_01\""));
        assert!(!json.contains("password"));
    }
}
