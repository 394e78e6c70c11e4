//! Accounts: model, storage, password hashing, use cases and HTTP handlers.

pub mod handlers;
mod model;
mod password;
mod postgres;
mod repository;
mod service;

pub use model::{LoginRequest, NewUser, RegisterRequest, Role, User};
pub use password::{BcryptHasher, HashError, PasswordHasher};
pub use postgres::PgUserRepository;
pub use repository::{MemoryUserRepository, StoreError, UserRepository};
pub use service::{ServiceError, UserService};
