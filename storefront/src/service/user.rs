use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::auth::PasswordHasher;
use crate::error::{Result, StorefrontError};
use crate::model::{NewUser, User, UserRow, USERS};
use crate::store::{Filter, StoreError, Table, TableStore};

/// Password checked against [`UserService`]'s decoy digest when the
/// username is unknown, so both failures cost one bcrypt verification
const DECOY_PASSWORD: &str = "storefront-decoy-password";

/// Registration and credential checks
#[derive(Clone)]
pub struct UserService {
    users: Table<User>,
    hasher: PasswordHasher,
    decoy_digest: Arc<str>,
}

/// Usernames are compared without surrounding whitespace
fn normalize_username(username: &str) -> &str {
    username.trim()
}

impl UserService {
    pub fn new(store: Arc<dyn TableStore>, hasher: PasswordHasher) -> Self {
        let decoy_digest = hasher.hash(DECOY_PASSWORD).unwrap_or_else(|e| {
            error!("Could not prepare decoy password digest: {}", e);
            String::new()
        });

        Self {
            users: Table::new(store, USERS),
            hasher,
            decoy_digest: decoy_digest.into(),
        }
    }

    /// Create an account. Fails with `DuplicateUsername` if the name is taken,
    /// whether the pre-check or the store's unique constraint notices first.
    pub async fn register(&self, request: NewUser) -> Result<User> {
        let username = normalize_username(&request.username);
        if username.is_empty() {
            return Err(StorefrontError::validation("username is required"));
        }
        if request.password.is_empty() {
            return Err(StorefrontError::validation("password is required"));
        }

        if self.find_by_username(username).await?.is_some() {
            warn!("Registration rejected, username taken: {}", username);
            return Err(StorefrontError::DuplicateUsername(username.to_string()));
        }

        let hashed_password = self.hasher.hash(&request.password)?;
        let row = UserRow {
            username,
            email: &request.email,
            hashed_password: &hashed_password,
        };

        let user = self.users.insert(&row).await.map_err(|e| match e {
            StoreError::UniqueViolation(_) => StorefrontError::DuplicateUsername(username.to_string()),
            other => other.into(),
        })?;

        info!("Registered user {} (ID: {})", user.username, user.id);
        Ok(user)
    }

    /// Check a username/password pair. Unknown usernames still pay for one
    /// bcrypt verification.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let username = normalize_username(username);
        let Some(user) = self.find_by_username(username).await? else {
            self.hasher.verify(password, &self.decoy_digest);
            debug!("Login attempt for unknown user: {}", username);
            return Err(StorefrontError::Authentication);
        };

        if !self.hasher.verify(password, &user.hashed_password) {
            debug!("Invalid password for: {}", username);
            return Err(StorefrontError::Authentication);
        }

        info!("Authenticated user: {}", username);
        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users.find_one(&[Filter::eq("username", username)]).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.find_one(&[Filter::eq("id", id)]).await?)
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        Ok(self.users.find(&[]).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Row};
    use async_trait::async_trait;

    fn service() -> UserService {
        UserService::new(Arc::new(MemoryStore::for_storefront()), PasswordHasher::new(4))
    }

    fn alice() -> NewUser {
        NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "wonderland".into(),
        }
    }

    #[tokio::test]
    async fn test_register_stores_hash_not_password() {
        let users = service();
        let user = users.register(alice()).await.unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert_ne!(user.hashed_password, "wonderland");
        assert_eq!(users.get(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_register_twice_is_duplicate() {
        let users = service();
        users.register(alice()).await.unwrap();

        let err = users.register(alice()).await.unwrap_err();
        assert!(matches!(err, StorefrontError::DuplicateUsername(name) if name == "alice"));
        assert_eq!(users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let users = service();

        let mut blank_name = alice();
        blank_name.username = "  ".into();
        assert!(matches!(users.register(blank_name).await, Err(StorefrontError::Validation(_))));

        let mut blank_password = alice();
        blank_password.password = String::new();
        assert!(matches!(users.register(blank_password).await, Err(StorefrontError::Validation(_))));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let users = service();
        let registered = users.register(alice()).await.unwrap();

        let user = users.authenticate("alice", "wonderland").await.unwrap();
        assert_eq!(user.id, registered.id);

        for wrong in ["Wonderland", "wonderland ", ""] {
            assert!(matches!(
                users.authenticate("alice", wrong).await,
                Err(StorefrontError::Authentication)
            ));
        }
        assert!(matches!(
            users.authenticate("bob", "wonderland").await,
            Err(StorefrontError::Authentication)
        ));
    }

    #[tokio::test]
    async fn test_username_whitespace_is_ignored_on_login() {
        let users = service();
        let mut padded = alice();
        padded.username = " alice ".into();
        let registered = users.register(padded).await.unwrap();
        assert_eq!(registered.username, "alice");

        let user = users.authenticate(" alice ", "wonderland").await.unwrap();
        assert_eq!(user.id, registered.id);
        assert_eq!(users.authenticate("alice\t", "wonderland").await.unwrap().id, registered.id);
    }

    #[test]
    fn test_decoy_digest_is_a_real_digest_at_the_configured_cost() {
        let users = service();
        assert!(users.decoy_digest.starts_with("$2b$04$"));
        assert!(users.hasher.verify(DECOY_PASSWORD, &users.decoy_digest));
        assert!(!users.hasher.verify("wonderland", &users.decoy_digest));
    }

    #[tokio::test]
    async fn test_unknown_user_with_decoy_password_is_rejected() {
        let users = service();
        assert!(matches!(
            users.authenticate("nobody", DECOY_PASSWORD).await,
            Err(StorefrontError::Authentication)
        ));
    }

    /// Store whose lookups never see existing rows, so only the unique
    /// constraint can catch a duplicate.
    struct BlindLookups(MemoryStore);

    #[async_trait]
    impl TableStore for BlindLookups {
        async fn select(&self, _table: &str, _filters: &[Filter]) -> crate::store::StoreResult<Vec<Row>> {
            Ok(Vec::new())
        }
        async fn insert(&self, table: &str, row: Row) -> crate::store::StoreResult<Row> {
            self.0.insert(table, row).await
        }
        async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> crate::store::StoreResult<Vec<Row>> {
            self.0.update(table, filters, patch).await
        }
        async fn delete(&self, table: &str, filters: &[Filter]) -> crate::store::StoreResult<Vec<Row>> {
            self.0.delete(table, filters).await
        }
    }

    #[tokio::test]
    async fn test_unique_violation_maps_to_duplicate() {
        let users = UserService::new(
            Arc::new(BlindLookups(MemoryStore::for_storefront())),
            PasswordHasher::new(4),
        );
        users.register(alice()).await.unwrap();

        let err = users.register(alice()).await.unwrap_err();
        assert!(matches!(err, StorefrontError::DuplicateUsername(_)));
    }
}
