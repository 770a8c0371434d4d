use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo_types::{NewUser, ProfileUpdate, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate {0}")]
    Duplicate(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt user record: {0}")]
    Corrupt(String),
}

/// Persistence for user records.
///
/// Emails are expected to be normalized (trimmed, lowercase) by the caller;
/// implementations still compare case-insensitively. Every write touches only
/// the columns it names and is atomic per record. Writes return `None` when
/// no record matched, e.g. it was deleted or the token was already used.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Only matches while `reset_password_expires > now`.
    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;
    async fn list(&self) -> Result<Vec<User>, StoreError>;
    async fn insert(&self, new: NewUser) -> Result<User, StoreError>;

    /// Sets `is_verified` and clears the token of the record holding `token`.
    async fn mark_verified(&self, token: &str) -> Result<Option<User>, StoreError>;
    /// Replaces any outstanding reset token.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;
    /// Stores `password_hash` and clears the reset fields, only while `token`
    /// is still outstanding and unexpired at `now`.
    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError>;
    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileUpdate,
    ) -> Result<Option<User>, StoreError>;
    async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Process-local store used for development without Postgres and in tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `f` to the first record matching `pred` under the write lock.
    async fn modify<P, F>(&self, pred: P, f: F) -> Option<User>
    where
        P: Fn(&User) -> bool + Send,
        F: FnOnce(&mut User) + Send,
    {
        let mut users = self.users.write().await;
        let user = users.values_mut().find(|u| pred(u))?;
        f(user);
        user.updated_at = OffsetDateTime::now_utc();
        Some(user.clone())
    }
}

fn email_taken(users: &HashMap<Uuid, User>, email: &str, except: Option<Uuid>) -> bool {
    users
        .values()
        .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
}

fn reset_token_live(u: &User, token: &str, now: OffsetDateTime) -> bool {
    u.reset_password_token.as_deref() == Some(token)
        && u.reset_password_expires.is_some_and(|exp| exp > now)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| reset_token_live(u, token, now))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut all: Vec<User> = self.users.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if email_taken(&users, &new.email, None) {
            return Err(StoreError::Duplicate("email"));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            role: new.role,
            is_verified: false,
            verification_token: new.verification_token,
            reset_password_token: None,
            reset_password_expires: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn mark_verified(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .modify(
                |u| u.verification_token.as_deref() == Some(token),
                |u| {
                    u.is_verified = true;
                    u.verification_token = None;
                },
            )
            .await)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .modify(
                |u| u.id == id,
                |u| {
                    u.reset_password_token = Some(token.to_string());
                    u.reset_password_expires = Some(expires);
                },
            )
            .await)
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .modify(
                |u| reset_token_live(u, token, now),
                |u| {
                    u.password_hash = password_hash.to_string();
                    u.reset_password_token = None;
                    u.reset_password_expires = None;
                },
            )
            .await)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileUpdate,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        if let Some(email) = &changes.email {
            if email_taken(&users, email, Some(id)) {
                return Err(StoreError::Duplicate("email"));
            }
        }
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(first_name) = changes.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = last_name;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .modify(|u| u.id == id, |u| u.password_hash = password_hash.to_string())
            .await)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}
