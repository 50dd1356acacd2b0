use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                          // unique user ID
    pub username: String,                  // unique login name
    pub email: String,                     // unique, lower-cased
    #[serde(skip_serializing)]
    pub password_hash: String,             // Argon2 hash, not exposed in JSON
    #[serde(skip_serializing)]
    pub access_token: Option<String>,      // latest issued bearer token
    #[serde(skip_serializing)]
    pub password_reset_id: Option<Uuid>,   // set while a reset is pending
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_reset_pending(&self) -> bool {
        self.password_reset_id.is_some()
    }
}

/// Fields needed to insert a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub access_token: String,
}
