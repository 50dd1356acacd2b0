use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::error::{AccountError, AccountResult};
use crate::auth::repo_types::{NewUser, User};

/// Persistence for user records.
///
/// Implementations must enforce username and email uniqueness themselves and
/// report a violation as [`AccountError::Conflict`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> AccountResult<User>;

    async fn find_by_id(&self, id: Uuid) -> AccountResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> AccountResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> AccountResult<Option<User>>;

    async fn username_exists(&self, username: &str) -> AccountResult<bool>;

    async fn email_exists(&self, email: &str) -> AccountResult<bool>;

    /// Replace (or clear) the stored access token.
    async fn set_access_token(&self, id: Uuid, token: Option<String>) -> AccountResult<()>;

    /// Replace (or clear) the pending password reset marker.
    async fn set_password_reset(&self, id: Uuid, reset_id: Option<Uuid>) -> AccountResult<()>;

    /// Store a new hash and token and clear any pending reset.
    async fn update_credentials(
        &self,
        id: Uuid,
        password_hash: &str,
        access_token: &str,
    ) -> AccountResult<()>;

    /// Like `update_credentials`, but only when `reset_id` is still the
    /// pending marker. Returns false when it is not.
    async fn complete_password_reset(
        &self,
        id: Uuid,
        reset_id: Uuid,
        password_hash: &str,
        access_token: &str,
    ) -> AccountResult<bool>;
}

/// Postgres-backed store. Uniqueness comes from the `users_username_key`
/// and `users_email_key` constraints.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, access_token, \
                            password_reset_id, created_at, updated_at";

fn affected_one(rows: u64) -> AccountResult<()> {
    if rows == 0 {
        Err(AccountError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> AccountResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, access_token)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.access_token)
            .fetch_one(&self.db)
            .await?;
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> AccountResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> AccountResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AccountResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn username_exists(&self, username: &str) -> AccountResult<bool> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)"#)
                .bind(username)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn email_exists(&self, email: &str) -> AccountResult<bool> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)"#)
                .bind(email)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn set_access_token(&self, id: Uuid, token: Option<String>) -> AccountResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET access_token = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .execute(&self.db)
        .await?;
        affected_one(result.rows_affected())
    }

    async fn set_password_reset(&self, id: Uuid, reset_id: Option<Uuid>) -> AccountResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_reset_id = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reset_id)
        .execute(&self.db)
        .await?;
        affected_one(result.rows_affected())
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        password_hash: &str,
        access_token: &str,
    ) -> AccountResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, access_token = $3, password_reset_id = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(access_token)
        .execute(&self.db)
        .await?;
        affected_one(result.rows_affected())
    }

    async fn complete_password_reset(
        &self,
        id: Uuid,
        reset_id: Uuid,
        password_hash: &str,
        access_token: &str,
    ) -> AccountResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $3, access_token = $4, password_reset_id = NULL,
                updated_at = now()
            WHERE id = $1 AND password_reset_id = $2
            "#,
        )
        .bind(id)
        .bind(reset_id)
        .bind(password_hash)
        .bind(access_token)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
