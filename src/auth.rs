use crate::error::AuthError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of an authenticated identity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

/// The authenticated identity performing an action
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Identity-verification collaborator used by the report workflow
///
/// Implementations decide whether an identity/secret pair is valid and
/// which role the identity holds. The workflow itself never sees stored
/// secrets.
pub trait CredentialVerifier: Send + Sync {
    /// Check a username/password pair
    fn verify(&self, id: &str, secret: &str) -> bool;

    /// Role of a verified identity
    fn role(&self, _id: &str) -> Role {
        Role::User
    }
}

/// A configured account, as stored in the configuration file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserEntry {
    /// Username (unique identifier for the user)
    pub username: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    /// Role granted after login
    #[serde(default)]
    pub role: Role,
}

/// Fixed credential set checked against Argon2 hashes
#[derive(Clone, Debug, Default)]
pub struct CredentialTable {
    users: HashMap<String, UserEntry>,
}

impl CredentialTable {
    pub fn new(entries: impl IntoIterator<Item = UserEntry>) -> Self {
        Self {
            users: entries
                .into_iter()
                .map(|entry| (entry.username.clone(), entry))
                .collect(),
        }
    }

    /// Build a table from plaintext passwords, hashing each one
    ///
    /// Meant for development setups and tests; configuration files carry
    /// hashes instead.
    ///
    /// # Errors
    /// * `AuthError::Hash` if hashing fails
    pub fn from_plaintext(users: &[(&str, &str, Role)]) -> Result<Self, AuthError> {
        let mut entries = Vec::with_capacity(users.len());
        for (username, password, role) in users {
            entries.push(UserEntry {
                username: username.to_string(),
                password_hash: hash_password(password)?,
                role: *role,
            });
        }
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialVerifier for CredentialTable {
    fn verify(&self, id: &str, secret: &str) -> bool {
        self.users
            .get(id)
            .is_some_and(|user| verify_password(secret, &user.password_hash))
    }

    fn role(&self, id: &str) -> Role {
        self.users.get(id).map(|user| user.role).unwrap_or_default()
    }
}

/// Hash a password using Argon2
///
/// Creates a PHC-format Argon2id hash with a random salt, suitable for the
/// `password_hash` field of a [`UserEntry`].
///
/// # Errors
/// * `AuthError::Hash` if the password hashing fails
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check a plaintext password against a stored hash
///
/// A malformed stored hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
