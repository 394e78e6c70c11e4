//! Account use cases: registration, login and lookups.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use super::model::{LoginRequest, NewUser, RegisterRequest, Role, User};
use super::password::{HashError, PasswordHasher};
use super::repository::{StoreError, UserRepository};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("user already exists")]
    UserExists,

    #[error("user not found")]
    UserNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user is inactive")]
    UserInactive,

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => Self::UserExists,
            other => Self::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { repo, hasher }
    }

    /// Creates an active account with the `user` role.
    ///
    /// Username and email are checked up front; a unique violation raised by
    /// the store on a concurrent insert maps to the same
    /// [`ServiceError::UserExists`].
    pub async fn register(&self, req: RegisterRequest) -> Result<User, ServiceError> {
        let username = req.username.trim().to_string();
        let email = req.email.trim().to_lowercase();

        if self.repo.get_by_username(&username).await.inspect_err(log_store("check username"))?.is_some() {
            return Err(ServiceError::UserExists);
        }
        if self.repo.get_by_email(&email).await.inspect_err(log_store("check email"))?.is_some() {
            return Err(ServiceError::UserExists);
        }

        let password_hash = self.hash(req.password).await?;
        let user = self
            .repo
            .create(NewUser {
                username,
                email,
                password_hash,
                role: Role::User,
                is_active: true,
            })
            .await?;

        info!(user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// `req.username` is tried as a username first, then as an email.
    pub async fn login(&self, req: LoginRequest) -> Result<User, ServiceError> {
        let user = match self.repo.get_by_username(&req.username).await? {
            Some(user) => Some(user),
            None => self.repo.get_by_email(&req.username.trim().to_lowercase()).await?,
        };
        let user = user.ok_or(ServiceError::UserNotFound)?;

        if !user.is_active {
            return Err(ServiceError::UserInactive);
        }
        if !self.verify(req.password, user.password_hash.clone()).await? {
            return Err(ServiceError::InvalidCredentials);
        }

        info!(user_id = user.id, username = %user.username, "user logged in");
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, ServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .inspect_err(log_store("get user by id"))?
            .ok_or(ServiceError::UserNotFound)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<User, ServiceError> {
        self.repo
            .get_by_username(username)
            .await
            .inspect_err(log_store("get user by username"))?
            .ok_or(ServiceError::UserNotFound)
    }

    async fn hash(&self, password: String) -> Result<String, HashError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| HashError(e.to_string()))?
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, HashError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| HashError(e.to_string()))?
    }
}

fn log_store(action: &'static str) -> impl Fn(&StoreError) {
    move |err| error!(error = %err, "failed to {action}")
}
