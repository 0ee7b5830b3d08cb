use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    repo::{StoreError, UserStore},
    repo_types::User,
};

/// Process-local store used when no database is configured.
///
/// Lookups scan the map; every write holds the lock for its whole
/// check-then-insert so uniqueness holds under concurrent requests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blank(id: Uuid) -> User {
        User {
            id,
            email: None,
            password_hash: None,
            google_id: None,
            secret: None,
            session_version: 0,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email.as_deref() == Some(email)) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            email: Some(email.to_string()),
            password_hash: Some(password_hash.to_string()),
            ..Self::blank(Uuid::new_v4())
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_or_create_by_google_id(&self, google_id: &str) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if let Some(existing) = users
            .values()
            .find(|u| u.google_id.as_deref() == Some(google_id))
        {
            return Ok(existing.clone());
        }
        let user = User {
            google_id: Some(google_id.to_string()),
            ..Self::blank(Uuid::new_v4())
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if let Some(email) = user.email.as_deref() {
            let taken = users
                .values()
                .any(|u| u.id != user.id && u.email.as_deref() == Some(email));
            if taken {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let slot = users.get_mut(&user.id).ok_or(StoreError::NotFound(user.id))?;
        // created_at is owned by the store
        *slot = User {
            created_at: slot.created_at,
            ..user.clone()
        };
        Ok(())
    }

    async fn find_all_with_secret(&self) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        let mut with_secret: Vec<User> = users
            .values()
            .filter(|u| u.secret.is_some())
            .cloned()
            .collect();
        with_secret.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(with_secret)
    }
}
