//! Username/password authentication.
//!
//! [`Authenticator`] is the seam to whatever owns user accounts. The crate
//! ships [`UserDirectory`], an in-memory implementation seeded from
//! configuration that also supports self-registration.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use crate::AuthResult;
use crate::config::{ConfigError, UserSeed};
use crate::error::AuthError;
use crate::password::{hash_password, is_phc_hash, verify_password};
use crate::types::{Principal, ROLE_USER};

/// Verifies credentials and looks up principals.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verifies `password` for `username`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::BadCredentials` if the user is unknown or the
    /// password does not match.
    async fn authenticate(&self, username: &str, password: &str) -> AuthResult<Principal>;

    /// Looks up the current state of a principal, e.g. to refresh its roles.
    async fn find(&self, username: &str) -> AuthResult<Option<Principal>>;
}

#[derive(Debug, Clone)]
struct UserRecord {
    password_hash: String,
    roles: Vec<String>,
}

/// In-memory user accounts with argon2 password hashes.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<String, UserRecord>,
}

impl UserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory from configured seeds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a hash is not a PHC string or a
    /// username appears twice.
    pub fn from_seeds(seeds: &[UserSeed]) -> Result<Self, ConfigError> {
        let directory = Self::new();
        for seed in seeds {
            if !is_phc_hash(&seed.password_hash) {
                return Err(ConfigError::InvalidValue(format!(
                    "auth.users '{}' has an invalid password_hash",
                    seed.username
                )));
            }
            let record = UserRecord {
                password_hash: seed.password_hash.clone(),
                roles: seed.roles.clone(),
            };
            if directory.users.insert(seed.username.clone(), record).is_some() {
                return Err(ConfigError::InvalidValue(format!(
                    "auth.users '{}' is defined twice",
                    seed.username
                )));
            }
        }
        Ok(directory)
    }

    /// Adds a user with an explicit role set, hashing `password`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the username is taken.
    pub fn add_user(
        &self,
        username: &str,
        password: &str,
        roles: Vec<String>,
    ) -> AuthResult<Principal> {
        let password_hash =
            hash_password(password).map_err(|e| AuthError::internal(e.to_string()))?;
        self.insert_new(username, password_hash, roles)
    }

    /// Registers a new account with `ROLE_USER`.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidRequest` if username or password is blank
    /// - `AuthError::Conflict` if the username is taken
    pub async fn register(&self, username: &str, password: &str) -> AuthResult<Principal> {
        let username = username.trim();
        if username.is_empty() || password.trim().is_empty() {
            return Err(AuthError::invalid_request(
                "Username and password are required",
            ));
        }
        if self.users.contains_key(username) {
            return Err(AuthError::conflict(format!(
                "Username '{username}' is already taken"
            )));
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::internal(e.to_string()))?
            .map_err(|e| AuthError::internal(e.to_string()))?;

        let principal = self.insert_new(username, password_hash, vec![ROLE_USER.to_string()])?;
        info!(username = %principal.username, "User registered");
        Ok(principal)
    }

    fn insert_new(
        &self,
        username: &str,
        password_hash: String,
        roles: Vec<String>,
    ) -> AuthResult<Principal> {
        match self.users.entry(username.to_string()) {
            Entry::Occupied(_) => Err(AuthError::conflict(format!(
                "Username '{username}' is already taken"
            ))),
            Entry::Vacant(slot) => {
                let principal = Principal::new(username, roles.clone());
                slot.insert(UserRecord {
                    password_hash,
                    roles,
                });
                Ok(principal)
            }
        }
    }

    /// Number of accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if there are no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl Authenticator for UserDirectory {
    async fn authenticate(&self, username: &str, password: &str) -> AuthResult<Principal> {
        let Some(record) = self.users.get(username).map(|r| r.value().clone()) else {
            return Err(AuthError::BadCredentials);
        };

        let password = password.to_string();
        let hash = record.password_hash;
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::internal(e.to_string()))?
            .map_err(|e| AuthError::internal(e.to_string()))?;

        if matches {
            Ok(Principal::new(username, record.roles))
        } else {
            Err(AuthError::BadCredentials)
        }
    }

    async fn find(&self, username: &str) -> AuthResult<Option<Principal>> {
        Ok(self
            .users
            .get(username)
            .map(|record| Principal::new(username, record.roles.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ROLE_ADMIN;

    #[tokio::test]
    async fn test_authenticate_seeded_user() {
        let seeds = vec![UserSeed {
            username: "admin".to_string(),
            password_hash: hash_password("admin").unwrap(),
            roles: vec![ROLE_ADMIN.to_string()],
        }];
        let directory = UserDirectory::from_seeds(&seeds).unwrap();

        let principal = directory.authenticate("admin", "admin").await.unwrap();
        assert_eq!(principal.username, "admin");
        assert!(principal.is_admin());
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let directory = UserDirectory::new();
        directory
            .add_user("alice", "password", vec![ROLE_USER.to_string()])
            .unwrap();

        assert!(matches!(
            directory.authenticate("alice", "nope").await,
            Err(AuthError::BadCredentials)
        ));
        assert!(matches!(
            directory.authenticate("mallory", "password").await,
            Err(AuthError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let directory = UserDirectory::new();
        let principal = directory.register("bob", "hunter2").await.unwrap();
        assert_eq!(principal.roles, vec![ROLE_USER.to_string()]);

        let logged_in = directory.authenticate("bob", "hunter2").await.unwrap();
        assert_eq!(logged_in, principal);
    }

    #[tokio::test]
    async fn test_register_conflict_and_blank() {
        let directory = UserDirectory::new();
        directory.register("bob", "pw").await.unwrap();

        assert!(matches!(
            directory.register("bob", "other").await,
            Err(AuthError::Conflict { .. })
        ));
        assert!(matches!(
            directory.register("  ", "pw").await,
            Err(AuthError::InvalidRequest { .. })
        ));
        assert!(matches!(
            directory.register("carol", "").await,
            Err(AuthError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_returns_current_roles() {
        let directory = UserDirectory::new();
        directory
            .add_user("root", "pw", vec![ROLE_ADMIN.to_string()])
            .unwrap();

        let found = directory.find("root").await.unwrap().unwrap();
        assert!(found.is_admin());
        assert!(directory.find("ghost").await.unwrap().is_none());
    }

    #[test]
    fn test_from_seeds_rejects_plaintext_hash() {
        let seeds = vec![UserSeed {
            username: "user".to_string(),
            password_hash: "password".to_string(),
            roles: vec![],
        }];
        let err = UserDirectory::from_seeds(&seeds).unwrap_err();
        assert!(err.to_string().contains("password_hash"));
    }
}
