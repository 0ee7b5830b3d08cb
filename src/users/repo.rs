use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::repo_types::User;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user {0} not found")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence of user records.
///
/// Emails are expected to be normalized by the caller; the store compares
/// them byte for byte.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a locally registered user.
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Return the user linked to `google_id`, creating it on first sight.
    async fn find_or_create_by_google_id(&self, google_id: &str) -> Result<User, StoreError>;

    /// Persist every mutable field of `user`.
    async fn save(&self, user: &User) -> Result<(), StoreError>;

    /// All users that have submitted a secret, oldest first.
    async fn find_all_with_secret(&self) -> Result<Vec<User>, StoreError>;
}
