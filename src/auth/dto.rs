use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo_types::User;

/// Request body for user registration.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

/// Request body for an authenticated password change.
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Returned by register, login and change-password.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
}

/// Public view of the authenticated user.
#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentUserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<User> for CurrentUserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.username,
            email: user.email,
        }
    }
}
