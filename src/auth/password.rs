use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;
use uuid::Uuid;

use crate::auth::error::{AccountError, AccountResult};

lazy_static! {
    /// Hash of a random throwaway password, checked in place of a missing account.
    static ref DUMMY_HASH: Option<String> = hash_password(&Uuid::new_v4().to_string()).ok();
}

#[cfg(test)]
thread_local! {
    pub(crate) static VERIFY_CALLS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

pub fn hash_password(plain: &str) -> AccountResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            AccountError::Internal(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> AccountResult<bool> {
    #[cfg(test)]
    VERIFY_CALLS.with(|calls| calls.set(calls.get() + 1));

    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        AccountError::Internal(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Spend the same Argon2 work as a real check when there is no hash to check.
pub fn verify_dummy_password(plain: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(plain, hash);
    }
}

/// Build the dummy hash now so the first unknown-account login is not faster.
pub fn warm_up() {
    lazy_static::initialize(&DUMMY_HASH);
}
