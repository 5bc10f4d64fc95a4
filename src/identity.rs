//! Credential service boundary. The gateway in `auth` treats this as an
//! opaque identity provider: it hands out stable uids and verifies
//! email/password pairs, nothing more. Profile data lives in the document
//! store, not here.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

/// What the identity service knows about a signed-in user. The display name
/// is captured at registration and used to synthesize a profile when the
/// backing profile record is unreadable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub uid: String,
    pub email: String,
    pub display_name: String,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Creates a credential for a new email. `AlreadyExists` if the email is
    /// taken.
    async fn create_credential(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Credential, AppError>;

    /// Verifies an email/password pair. `InvalidCredentials` for unknown
    /// email or wrong password, `TooManyAttempts` once the failure budget
    /// for that email is spent.
    async fn verify_credential(&self, email: &str, password: &str)
        -> Result<Credential, AppError>;

    /// Resolves a uid back to its credential, if any.
    async fn lookup(&self, uid: &str) -> Result<Option<Credential>, AppError>;
}

#[derive(Serialize, Deserialize)]
struct CredentialRecord {
    uid: String,
    email: String,
    display_name: String,
    salt: String,
    digest: String,
}

impl CredentialRecord {
    fn new(email: &str, password: &str, display_name: &str) -> Self {
        let salt = Uuid::new_v4().to_string();
        Self {
            uid: Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            digest: digest_password(&salt, password),
            salt,
        }
    }

    fn matches(&self, password: &str) -> bool {
        self.digest == digest_password(&self.salt, password)
    }

    fn credential(&self) -> Credential {
        Credential {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct RedisIdentity {
    connection: ConnectionManager,
    max_attempts: u32,
    attempt_window: Duration,
}

impl RedisIdentity {
    pub fn new(connection: ConnectionManager, max_attempts: u32, attempt_window: Duration) -> Self {
        Self {
            connection,
            max_attempts,
            attempt_window,
        }
    }

    fn credential_key(email: &str) -> String {
        format!("cred:{email}")
    }

    fn uid_key(uid: &str) -> String {
        format!("cred:uid:{uid}")
    }

    fn attempts_key(email: &str) -> String {
        format!("cred:attempts:{email}")
    }

    async fn record_failure(&self, email: &str) -> Result<(), AppError> {
        let mut conn = self.connection.clone();
        let key = Self::attempts_key(email);

        redis::pipe()
            .incr(&key, 1u32)
            .ignore()
            .expire(&key, self.attempt_window.as_secs() as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl IdentityService for RedisIdentity {
    async fn create_credential(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Credential, AppError> {
        let mut conn = self.connection.clone();

        let record = CredentialRecord::new(email, password, display_name);
        let json = serde_json::to_string(&record)?;

        // SET NX makes the uniqueness check and the write one atomic step.
        let created: bool = conn.set_nx(Self::credential_key(email), json).await?;
        if !created {
            return Err(AppError::AlreadyExists);
        }

        conn.set::<_, _, ()>(Self::uid_key(&record.uid), email)
            .await?;

        Ok(record.credential())
    }

    async fn verify_credential(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Credential, AppError> {
        let mut conn = self.connection.clone();

        let failures: Option<u32> = conn.get(Self::attempts_key(email)).await?;
        if failures.unwrap_or(0) >= self.max_attempts {
            return Err(AppError::TooManyAttempts);
        }

        let raw: Option<String> = conn.get(Self::credential_key(email)).await?;
        let record: CredentialRecord = match raw {
            Some(json) => serde_json::from_str(&json)?,
            None => {
                self.record_failure(email).await?;
                return Err(AppError::InvalidCredentials);
            }
        };

        if !record.matches(password) {
            self.record_failure(email).await?;
            return Err(AppError::InvalidCredentials);
        }

        conn.del::<_, ()>(Self::attempts_key(email)).await?;

        Ok(record.credential())
    }

    async fn lookup(&self, uid: &str) -> Result<Option<Credential>, AppError> {
        let mut conn = self.connection.clone();

        let email: Option<String> = conn.get(Self::uid_key(uid)).await?;
        let Some(email) = email else {
            return Ok(None);
        };

        let raw: Option<String> = conn.get(Self::credential_key(&email)).await?;
        match raw {
            Some(json) => {
                let record: CredentialRecord = serde_json::from_str(&json)?;
                Ok(Some(record.credential()))
            }
            None => Ok(None),
        }
    }
}

/// In-memory identity provider with the same failure-budget behavior, used
/// by tests and for running without redis.
pub struct MemoryIdentity {
    inner: Mutex<MemoryInner>,
    max_attempts: u32,
    attempt_window: Duration,
}

#[derive(Default)]
struct MemoryInner {
    by_email: HashMap<String, CredentialRecord>,
    failures: HashMap<String, (u32, Instant)>,
}

impl MemoryIdentity {
    pub fn new(max_attempts: u32, attempt_window: Duration) -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            max_attempts,
            attempt_window,
        }
    }
}

impl MemoryInner {
    fn live_failures(&self, email: &str, window: Duration) -> u32 {
        match self.failures.get(email) {
            Some((count, since)) if since.elapsed() < window => *count,
            _ => 0,
        }
    }

    fn record_failure(&mut self, email: &str, window: Duration) {
        let entry = self.failures.entry(email.to_string()).or_insert((0, Instant::now()));
        if entry.1.elapsed() >= window {
            *entry = (0, Instant::now());
        }
        entry.0 += 1;
    }
}

#[async_trait]
impl IdentityService for MemoryIdentity {
    async fn create_credential(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Credential, AppError> {
        let mut inner = self.inner.lock().await;

        if inner.by_email.contains_key(email) {
            return Err(AppError::AlreadyExists);
        }

        let record = CredentialRecord::new(email, password, display_name);
        let credential = record.credential();
        inner.by_email.insert(email.to_string(), record);

        Ok(credential)
    }

    async fn verify_credential(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Credential, AppError> {
        let mut inner = self.inner.lock().await;

        if inner.live_failures(email, self.attempt_window) >= self.max_attempts {
            return Err(AppError::TooManyAttempts);
        }

        match inner.by_email.get(email) {
            Some(record) if record.matches(password) => {
                let credential = record.credential();
                inner.failures.remove(email);
                Ok(credential)
            }
            _ => {
                inner.record_failure(email, self.attempt_window);
                Err(AppError::InvalidCredentials)
            }
        }
    }

    async fn lookup(&self, uid: &str) -> Result<Option<Credential>, AppError> {
        let inner = self.inner.lock().await;

        Ok(inner
            .by_email
            .values()
            .find(|record| record.uid == uid)
            .map(CredentialRecord::credential))
    }
}
