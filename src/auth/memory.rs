use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::error::{AccountError, AccountResult};
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUser, User};

/// In-memory store for tests and local development.
///
/// Uniqueness is checked and the record inserted under the same write lock,
/// so concurrent inserts of one username or email cannot both succeed.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, id: Uuid, f: F) -> AccountResult<()>
    where
        F: FnOnce(&mut User) + Send,
    {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(AccountError::NotFound)?;
        f(user);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: NewUser) -> AccountResult<User> {
        let mut users = self.users.write().await;

        let taken = users.values().any(|u| {
            u.id == user.id || u.username == user.username || u.email == user.email
        });
        if taken {
            return Err(AccountError::Conflict);
        }

        let now = OffsetDateTime::now_utc();
        let record = User {
            id: user.id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            access_token: Some(user.access_token),
            password_reset_id: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> AccountResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AccountResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AccountResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn username_exists(&self, username: &str) -> AccountResult<bool> {
        let users = self.users.read().await;
        Ok(users.values().any(|u| u.username == username))
    }

    async fn email_exists(&self, email: &str) -> AccountResult<bool> {
        let users = self.users.read().await;
        Ok(users.values().any(|u| u.email == email))
    }

    async fn set_access_token(&self, id: Uuid, token: Option<String>) -> AccountResult<()> {
        self.modify(id, |u| u.access_token = token).await
    }

    async fn set_password_reset(&self, id: Uuid, reset_id: Option<Uuid>) -> AccountResult<()> {
        self.modify(id, |u| u.password_reset_id = reset_id).await
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        password_hash: &str,
        access_token: &str,
    ) -> AccountResult<()> {
        self.modify(id, |u| {
            u.password_hash = password_hash.to_string();
            u.access_token = Some(access_token.to_string());
            u.password_reset_id = None;
        })
        .await
    }

    async fn complete_password_reset(
        &self,
        id: Uuid,
        reset_id: Uuid,
        password_hash: &str,
        access_token: &str,
    ) -> AccountResult<bool> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(AccountError::NotFound)?;
        if user.password_reset_id != Some(reset_id) {
            return Ok(false);
        }
        user.password_hash = password_hash.to_string();
        user.access_token = Some(access_token.to_string());
        user.password_reset_id = None;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }
}
