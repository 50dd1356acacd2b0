use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: Uuid,    // user ID
    pub jti: Uuid,   // unique per issued token
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
}
