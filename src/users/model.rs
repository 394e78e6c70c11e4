use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

// Conversion from the `role` text column.
impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored account. The password hash never leaves the process.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Fields of an account that does not exist yet.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// `username` may also hold an email address.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterRequest {
    /// Shape checks only; uniqueness is the service's job.
    pub fn validate(&self) -> Result<(), &'static str> {
        let username = self.username.chars().count();
        if !(3..=32).contains(&username) {
            return Err("username must be between 3 and 32 characters");
        }
        // Bytes, not chars: bcrypt ignores everything past the 72nd byte.
        if !(6..=72).contains(&self.password.len()) {
            return Err("password must be between 6 and 72 characters");
        }
        if self.email.is_empty() {
            return Err("email is required");
        }
        if !is_valid_email(&self.email) {
            return Err("invalid email format");
        }
        Ok(())
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.username.is_empty() {
            return Err("username is required");
        }
        if self.password.is_empty() {
            return Err("password is required");
        }
        Ok(())
    }
}

fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && email.contains('@') && email.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn register_shape_checks() {
        assert!(register("alice", "alice@example.com", "secret1").validate().is_ok());
        assert_eq!(
            register("al", "alice@example.com", "secret1").validate(),
            Err("username must be between 3 and 32 characters")
        );
        assert_eq!(
            register("alice", "alice@example.com", "short").validate(),
            Err("password must be between 6 and 72 characters")
        );
        assert_eq!(register("alice", "", "secret1").validate(), Err("email is required"));
        assert_eq!(register("alice", "alice-at-example", "secret1").validate(), Err("invalid email format"));
    }

    #[test]
    fn password_limit_counts_bytes() {
        // 40 chars, 120 bytes.
        let wide = "€".repeat(40);
        assert_eq!(
            register("alice", "alice@example.com", &wide).validate(),
            Err("password must be between 6 and 72 characters")
        );
        // 24 chars, exactly 72 bytes.
        assert!(register("alice", "alice@example.com", &"€".repeat(24)).validate().is_ok());
    }

    #[test]
    fn login_requires_both_fields() {
        let req = LoginRequest { username: "alice".into(), password: String::new() };
        assert_eq!(req.validate(), Err("password is required"));
    }

    #[test]
    fn serialized_user_hides_password_hash() {
        let now = Utc::now();
        let user = User {
            id: 1,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$2b$secret".into(),
            role: Role::User,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
    }
}
