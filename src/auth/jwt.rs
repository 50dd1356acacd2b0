use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::error::{AccountError, AccountResult};
use crate::config::JwtConfig;
use crate::state::AppState;

/// Signing and verification keys for access tokens.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl: Duration::from_secs((config.ttl_minutes.max(0) as u64) * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::new(&state.config.jwt)
    }
}

impl JwtKeys {
    /// Sign a token for `user_id` valid from now for the configured TTL.
    pub fn issue(&self, user_id: Uuid) -> AccountResult<String> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(&self, user_id: Uuid, now: OffsetDateTime) -> AccountResult<String> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            id: user_id,
            jti: Uuid::new_v4(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            AccountError::Internal(e.to_string())
        })?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    /// Check signature and expiry. Any failure is an authentication error.
    pub fn verify(&self, token: &str) -> AccountResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            AccountError::Authentication
        })?;
        debug!(user_id = %data.claims.id, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TOKEN_TTL_MINUTES;

    fn make_keys(secret: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
        })
    }

    #[test]
    fn issue_and_verify_maps_back_to_user() {
        let keys = make_keys("dev-secret");
        let user_id = Uuid::new_v4();
        let token = keys.issue(user_id).expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.id, user_id);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn tokens_issued_back_to_back_differ() {
        let keys = make_keys("dev-secret");
        let user_id = Uuid::new_v4();
        assert_ne!(keys.issue(user_id).unwrap(), keys.issue(user_id).unwrap());
    }

    #[test]
    fn token_older_than_a_week_is_rejected() {
        let keys = make_keys("dev-secret");
        let issued = OffsetDateTime::now_utc() - TimeDuration::days(7) - TimeDuration::minutes(1);
        let token = keys.issue_at(Uuid::new_v4(), issued).unwrap();
        assert!(matches!(keys.verify(&token), Err(AccountError::Authentication)));
    }

    #[test]
    fn token_just_inside_a_week_is_accepted() {
        let keys = make_keys("dev-secret");
        let issued = OffsetDateTime::now_utc() - TimeDuration::days(7) + TimeDuration::minutes(1);
        let token = keys.issue_at(Uuid::new_v4(), issued).unwrap();
        assert!(keys.verify(&token).is_ok());
    }

    #[test]
    fn verify_rejects_other_secret() {
        let token = make_keys("secret-a").issue(Uuid::new_v4()).unwrap();
        let err = make_keys("secret-b").verify(&token).unwrap_err();
        assert!(matches!(err, AccountError::Authentication));
    }

    #[test]
    fn verify_rejects_garbage() {
        let keys = make_keys("dev-secret");
        assert!(keys.verify("not.a.jwt").is_err());
        assert!(keys.verify("").is_err());
    }
}
