use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::error::AccountResult;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUser, User};

/// Backoff settings for store calls that fail with `StoreUnavailable`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 50,
            max_delay_ms: 2000,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }
}

/// Run `operation`, retrying retryable failures with exponential backoff.
/// Non-retryable errors are returned immediately.
pub async fn retry_with_backoff<F, Fut, T>(mut operation: F, policy: &RetryPolicy) -> AccountResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AccountResult<T>>,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay_ms;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "store call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let wait = if policy.use_jitter {
                    apply_jitter(delay)
                } else {
                    delay
                };
                debug!(attempt, max = policy.max_retries, wait_ms = wait, error = %e, "store call failed, retrying");
                tokio::time::sleep(Duration::from_millis(wait)).await;
                delay = ((delay as f64 * policy.backoff_multiplier) as u64).min(policy.max_delay_ms);
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(attempts = attempt + 1, error = %e, "store call failed, giving up");
                }
                return Err(e);
            }
        }
    }
}

/// Somewhere between 50% and 100% of `delay`.
fn apply_jitter(delay: u64) -> u64 {
    let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
    (delay as f64 * factor) as u64
}

/// Wraps another store and retries its transient failures.
///
/// Reads and the overwrite-style updates are retried. `insert` and
/// `complete_password_reset` are not: if the first attempt committed but the
/// reply was lost, a second attempt would report `Conflict` or a stale reset
/// for an operation that succeeded.
#[derive(Clone)]
pub struct RetryingUserStore {
    inner: Arc<dyn UserStore>,
    policy: RetryPolicy,
}

impl RetryingUserStore {
    pub fn new(inner: Arc<dyn UserStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl UserStore for RetryingUserStore {
    async fn insert(&self, user: NewUser) -> AccountResult<User> {
        self.inner.insert(user).await
    }

    async fn find_by_id(&self, id: Uuid) -> AccountResult<Option<User>> {
        retry_with_backoff(|| self.inner.find_by_id(id), &self.policy).await
    }

    async fn find_by_username(&self, username: &str) -> AccountResult<Option<User>> {
        retry_with_backoff(|| self.inner.find_by_username(username), &self.policy).await
    }

    async fn find_by_email(&self, email: &str) -> AccountResult<Option<User>> {
        retry_with_backoff(|| self.inner.find_by_email(email), &self.policy).await
    }

    async fn username_exists(&self, username: &str) -> AccountResult<bool> {
        retry_with_backoff(|| self.inner.username_exists(username), &self.policy).await
    }

    async fn email_exists(&self, email: &str) -> AccountResult<bool> {
        retry_with_backoff(|| self.inner.email_exists(email), &self.policy).await
    }

    async fn set_access_token(&self, id: Uuid, token: Option<String>) -> AccountResult<()> {
        retry_with_backoff(|| self.inner.set_access_token(id, token.clone()), &self.policy).await
    }

    async fn set_password_reset(&self, id: Uuid, reset_id: Option<Uuid>) -> AccountResult<()> {
        retry_with_backoff(|| self.inner.set_password_reset(id, reset_id), &self.policy).await
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        password_hash: &str,
        access_token: &str,
    ) -> AccountResult<()> {
        retry_with_backoff(
            || self.inner.update_credentials(id, password_hash, access_token),
            &self.policy,
        )
        .await
    }

    async fn complete_password_reset(
        &self,
        id: Uuid,
        reset_id: Uuid,
        password_hash: &str,
        access_token: &str,
    ) -> AccountResult<bool> {
        self.inner
            .complete_password_reset(id, reset_id, password_hash, access_token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::AccountError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_initial_delay(1)
            .without_jitter()
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AccountError::StoreUnavailable("connection reset".into()))
                    } else {
                        Ok("ok")
                    }
                }
            },
            &fast_policy(3),
        )
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: AccountResult<()> = retry_with_backoff(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AccountError::StoreUnavailable("down".into())) }
            },
            &fast_policy(2),
        )
        .await;

        assert!(matches!(result, Err(AccountError::StoreUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn expected_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: AccountResult<()> = retry_with_backoff(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AccountError::Conflict) }
            },
            &fast_policy(5),
        )
        .await;

        assert!(matches!(result, Err(AccountError::Conflict)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..20 {
            let d = apply_jitter(1000);
            assert!((500..=1000).contains(&d));
        }
    }

    /// Fails the first `failures` lookups, then delegates. Writes that are
    /// not safe to repeat fail whenever `failing_writes` is set.
    struct FlakyStore {
        inner: crate::auth::memory::InMemoryUserStore,
        failures: AtomicU32,
        failing_writes: bool,
        write_calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32, failing_writes: bool) -> Self {
            Self {
                inner: crate::auth::memory::InMemoryUserStore::new(),
                failures: AtomicU32::new(failures),
                failing_writes,
                write_calls: AtomicU32::new(0),
            }
        }

        fn write(&self) -> AccountResult<()> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_writes {
                return Err(AccountError::StoreUnavailable("reply lost".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl UserStore for FlakyStore {
        async fn insert(&self, user: NewUser) -> AccountResult<User> {
            self.write()?;
            self.inner.insert(user).await
        }
        async fn find_by_id(&self, id: Uuid) -> AccountResult<Option<User>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AccountError::StoreUnavailable("flaky".into()));
            }
            self.inner.find_by_id(id).await
        }
        async fn find_by_username(&self, username: &str) -> AccountResult<Option<User>> {
            self.inner.find_by_username(username).await
        }
        async fn find_by_email(&self, email: &str) -> AccountResult<Option<User>> {
            self.inner.find_by_email(email).await
        }
        async fn username_exists(&self, username: &str) -> AccountResult<bool> {
            self.inner.username_exists(username).await
        }
        async fn email_exists(&self, email: &str) -> AccountResult<bool> {
            self.inner.email_exists(email).await
        }
        async fn set_access_token(&self, id: Uuid, token: Option<String>) -> AccountResult<()> {
            self.inner.set_access_token(id, token).await
        }
        async fn set_password_reset(&self, id: Uuid, reset_id: Option<Uuid>) -> AccountResult<()> {
            self.inner.set_password_reset(id, reset_id).await
        }
        async fn update_credentials(&self, id: Uuid, h: &str, t: &str) -> AccountResult<()> {
            self.inner.update_credentials(id, h, t).await
        }
        async fn complete_password_reset(
            &self,
            id: Uuid,
            reset_id: Uuid,
            h: &str,
            t: &str,
        ) -> AccountResult<bool> {
            self.write()?;
            self.inner.complete_password_reset(id, reset_id, h, t).await
        }
    }

    #[tokio::test]
    async fn retrying_store_hides_transient_outage() {
        let flaky = Arc::new(FlakyStore::new(2, false));
        let user = flaky.insert(new_user()).await.unwrap();

        let store = RetryingUserStore::new(flaky, fast_policy(3));
        let found = store.find_by_id(user.id).await.unwrap();
        assert_eq!(found.map(|u| u.username).as_deref(), Some("dave"));
    }

    fn new_user() -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            username: "dave".into(),
            email: "dave@example.com".into(),
            password_hash: "hash".into(),
            access_token: "token".into(),
        }
    }

    #[tokio::test]
    async fn non_repeatable_writes_are_attempted_once() {
        let flaky = Arc::new(FlakyStore::new(0, true));
        let store = RetryingUserStore::new(flaky.clone(), fast_policy(3));

        let insert = store.insert(new_user()).await;
        assert!(matches!(insert, Err(AccountError::StoreUnavailable(_))));
        assert_eq!(flaky.write_calls.load(Ordering::SeqCst), 1);

        let reset = store
            .complete_password_reset(Uuid::new_v4(), Uuid::new_v4(), "hash", "token")
            .await;
        assert!(matches!(reset, Err(AccountError::StoreUnavailable(_))));
        assert_eq!(flaky.write_calls.load(Ordering::SeqCst), 2);
    }
}
