use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::users::{
    repo::{AccountStore, StoreError},
    repo_types::{NewUser, User, UserChanges},
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: BTreeMap<i64, User>,
}

/// In-memory `AccountStore` for development and tests.
///
/// Ids are assigned sequentially from 1. Data is lost on restart.
#[derive(Default)]
pub struct InMemoryAccountStore {
    inner: Mutex<Inner>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.inner.lock().await.users.len()
    }
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    #[instrument(skip(self, user))]
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.email_taken(&user.email, None) {
            warn!("duplicate email on insert");
            return Err(StoreError::DuplicateEmail);
        }
        inner.next_id += 1;
        let user = User {
            id: inner.next_id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Some(OffsetDateTime::now_utc()),
        };
        inner.users.insert(user.id, user.clone());
        debug!(user_id = user.id, "user inserted in memory");
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<User, StoreError> {
        self.inner
            .lock()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self, email))]
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.inner
            .lock()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.lock().await.users.values().cloned().collect())
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.users.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if inner.email_taken(&changes.email, Some(id)) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.name = changes.name;
        user.email = changes.email;
        Ok(user.clone())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        match self.inner.lock().await.users.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            password_hash: "$argon2id$fake".into(),
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids() {
        let store = InMemoryAccountStore::new();
        let a = store.create(new_user("alice", "a@example.com")).await.unwrap();
        let b = store.create(new_user("bobby", "b@example.com")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert!(a.created_at.is_some());
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_duplicate_email() {
        let store = InMemoryAccountStore::new();
        store.create(new_user("alice", "a@example.com")).await.unwrap();
        let err = store.create(new_user("other", "a@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn update_keeps_password_and_checks_email() {
        let store = InMemoryAccountStore::new();
        let a = store.create(new_user("alice", "a@example.com")).await.unwrap();
        store.create(new_user("bobby", "b@example.com")).await.unwrap();

        let updated = store
            .update(a.id, UserChanges { name: "alicia".into(), email: "alicia@example.com".into() })
            .await
            .unwrap();
        assert_eq!(updated.name, "alicia");
        assert_eq!(updated.password_hash, a.password_hash);

        let err = store
            .update(a.id, UserChanges { name: "alicia".into(), email: "b@example.com".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));

        // Re-saving its own email is not a conflict.
        store
            .update(a.id, UserChanges { name: "ally".into(), email: "alicia@example.com".into() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let store = InMemoryAccountStore::new();
        assert!(matches!(store.get(7).await, Err(StoreError::NotFound)));
        assert!(matches!(store.delete(7).await, Err(StoreError::NotFound)));
        assert!(matches!(
            store.update(7, UserChanges { name: "ghost".into(), email: "g@example.com".into() }).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_by_email("nobody@example.com").await,
            Err(StoreError::NotFound)
        ));
    }
}
