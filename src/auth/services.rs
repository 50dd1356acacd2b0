use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::error::{AccountError, AccountResult};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_dummy_password, verify_password};
use crate::auth::policy::{validate_email, validate_password, validate_username};
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUser, User};
use crate::state::AppState;

/// Account use cases: registration, login, logout, password change and
/// password reset.
///
/// Per-account states are *active* and *reset-pending*. While a reset is
/// pending, login is refused with the same error as a wrong password.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
}

impl FromRef<AppState> for AccountService {
    fn from_ref(state: &AppState) -> Self {
        AccountService::new(state.store.clone(), JwtKeys::from_ref(state))
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl AccountService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self { store, keys }
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    async fn load(&self, user_id: Uuid) -> AccountResult<User> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AccountError::NotFound)
    }

    /// Username first, then email.
    async fn find_by_username_or_email(&self, identifier: &str) -> AccountResult<Option<User>> {
        if let Some(user) = self.store.find_by_username(identifier).await? {
            return Ok(Some(user));
        }
        self.store.find_by_email(&normalize_email(identifier)).await
    }

    /// Create an account and return its first access token.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AccountResult<String> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_username(username)?;
        validate_password(password)?;

        if self.store.email_exists(&email).await? || self.store.username_exists(username).await? {
            warn!("registration rejected: username or email taken");
            return Err(AccountError::Conflict);
        }

        let password_hash = hash_password(password)?;
        let id = Uuid::new_v4();
        let access_token = self.keys.issue(id)?;

        // The store's unique constraints settle races the check above misses.
        let user = self
            .store
            .insert(NewUser {
                id,
                username: username.to_string(),
                email,
                password_hash,
                access_token: access_token.clone(),
            })
            .await
            .inspect_err(|e| {
                if matches!(e, AccountError::Conflict) {
                    warn!("registration lost a uniqueness race");
                }
            })?;

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(access_token)
    }

    /// Check credentials and issue a fresh access token.
    ///
    /// Unknown account, wrong password and pending reset are indistinguishable
    /// to the caller.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username_or_email: &str, password: &str) -> AccountResult<String> {
        let user = self.find_by_username_or_email(username_or_email).await?;

        // Argon2 runs on every path so timing does not reveal which check failed.
        let password_ok = match &user {
            Some(user) => verify_password(password, &user.password_hash)?,
            None => {
                verify_dummy_password(password);
                false
            }
        };

        let Some(user) = user else {
            debug!("login for unknown account");
            return Err(AccountError::Authentication);
        };

        if user.is_reset_pending() {
            warn!(user_id = %user.id, "login attempted while password reset pending");
            return Err(AccountError::Authentication);
        }

        if !password_ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AccountError::Authentication);
        }

        let access_token = self.keys.issue(user.id)?;
        self.store
            .set_access_token(user.id, Some(access_token.clone()))
            .await?;

        info!(user_id = %user.id, "user logged in");
        Ok(access_token)
    }

    /// Forget the stored access token so it no longer authenticates.
    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: Uuid) -> AccountResult<()> {
        self.store.set_access_token(user_id, None).await?;
        info!(user_id = %user_id, "user logged out");
        Ok(())
    }

    /// Mark the account as awaiting a new password and return the reset id
    /// to be delivered out of band. A second call replaces the first id.
    #[instrument(skip(self))]
    pub async fn begin_password_reset(&self, username_or_email: &str) -> AccountResult<Uuid> {
        let user = self
            .find_by_username_or_email(username_or_email)
            .await?
            .ok_or(AccountError::NotFound)?;

        let reset_id = Uuid::new_v4();
        self.store.set_password_reset(user.id, Some(reset_id)).await?;

        info!(user_id = %user.id, "password reset started");
        Ok(reset_id)
    }

    #[instrument(skip(self, reset_id, new_password))]
    pub async fn finalize_password_reset(
        &self,
        user_id: Uuid,
        reset_id: Uuid,
        new_password: &str,
    ) -> AccountResult<String> {
        let user = self.load(user_id).await?;
        match user.password_reset_id {
            None => return Err(AccountError::State("no password reset pending")),
            Some(pending) if pending != reset_id => {
                warn!(user_id = %user_id, "password reset id mismatch");
                return Err(AccountError::State("password reset id does not match"));
            }
            Some(_) => {}
        }

        validate_password(new_password)?;
        let password_hash = hash_password(new_password)?;
        let access_token = self.keys.issue(user_id)?;

        let completed = self
            .store
            .complete_password_reset(user_id, reset_id, &password_hash, &access_token)
            .await?;
        if !completed {
            // Another reset replaced the id between the load and the update.
            return Err(AccountError::State("password reset id does not match"));
        }

        info!(user_id = %user_id, "password reset completed");
        Ok(access_token)
    }

    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> AccountResult<String> {
        validate_password(new_password)?;
        let user = self.load(user_id).await?;

        if !verify_password(old_password, &user.password_hash)? {
            warn!(user_id = %user_id, "password change with wrong current password");
            return Err(AccountError::Authentication);
        }

        let password_hash = hash_password(new_password)?;
        let access_token = self.keys.issue(user_id)?;
        self.store
            .update_credentials(user_id, &password_hash, &access_token)
            .await?;

        info!(user_id = %user_id, "password changed");
        Ok(access_token)
    }

    pub async fn is_password_reset_in_progress(&self, user_id: Uuid) -> AccountResult<bool> {
        Ok(self.load(user_id).await?.is_reset_pending())
    }

    pub async fn current_user(&self, user_id: Uuid) -> AccountResult<User> {
        self.load(user_id).await
    }

    /// Resolve a bearer token to its user.
    ///
    /// `Ok(None)` covers every kind of bad token, including one that was
    /// valid once but has since been replaced or logged out.
    pub async fn authenticate(&self, token: &str) -> AccountResult<Option<User>> {
        let Ok(claims) = self.keys.verify(token) else {
            return Ok(None);
        };
        let user = self.store.find_by_id(claims.id).await?;
        Ok(user.filter(|u| u.access_token.as_deref() == Some(token)))
    }
}
