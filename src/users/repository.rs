//! Persistence seam for accounts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;

use super::model::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique column (`username` or `email`) already holds this value.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error("user {0} does not exist")]
    NotFound(i64),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Single-statement CRUD over accounts. Lookups return `Ok(None)` when absent.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn update(&self, user: &User) -> Result<(), StoreError>;
    /// Soft delete: the row stays, `is_active` becomes false.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
    /// Round trip to the store, used by readiness.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Process-local store used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryUserRepository {
    inner: RwLock<Memory>,
}

#[derive(Default)]
struct Memory {
    next_id: i64,
    users: BTreeMap<i64, User>,
}

impl Memory {
    fn conflict(&self, id: Option<i64>, username: &str, email: &str) -> Option<&'static str> {
        let others = self.users.values().filter(|u| Some(u.id) != id);
        for user in others {
            if user.username == username {
                return Some("username");
            }
            if user.email == email {
                return Some("email");
            }
        }
        None
    }
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut mem = self.inner.write();
        if let Some(column) = mem.conflict(None, &user.username, &user.email) {
            return Err(StoreError::Duplicate(column));
        }
        mem.next_id += 1;
        let now = Utc::now();
        let stored = User {
            id: mem.next_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: user.is_active,
            created_at: now,
            updated_at: now,
        };
        mem.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().users.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().users.values().find(|u| u.username == username).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().users.values().find(|u| u.email == email).cloned())
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut mem = self.inner.write();
        if !mem.users.contains_key(&user.id) {
            return Err(StoreError::NotFound(user.id));
        }
        if let Some(column) = mem.conflict(Some(user.id), &user.username, &user.email) {
            return Err(StoreError::Duplicate(column));
        }
        let mut updated = user.clone();
        updated.updated_at = Utc::now();
        mem.users.insert(user.id, updated);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut mem = self.inner.write();
        let user = mem.users.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        user.is_active = false;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
