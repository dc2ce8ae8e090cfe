//! User and avatar persistence

use crate::storage::{ObjectStore, StoreError, StoreKeys, StoreResultFuture};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stored user document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Object key of the uploaded avatar, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_path: Option<String>,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        UserRecord {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            avatar_path: None,
        }
    }
}

pub trait UserRepository: Send + Sync + 'static {
    fn find_by_id<'a>(&'a self, user_id: &'a str) -> StoreResultFuture<'a, Option<UserRecord>>;

    fn save<'a>(&'a self, user: &'a UserRecord) -> StoreResultFuture<'a, ()>;
}

pub trait AvatarStore: Send + Sync + 'static {
    /// Persist avatar bytes; resolves to the path once the write is durable
    fn write_avatar<'a>(&'a self, user_id: &'a str, data: &'a [u8]) -> StoreResultFuture<'a, String>;

    fn read_avatar<'a>(&'a self, path: &'a str) -> StoreResultFuture<'a, Vec<u8>>;
}

impl<T: UserRepository + ?Sized> UserRepository for Arc<T> {
    fn find_by_id<'a>(&'a self, user_id: &'a str) -> StoreResultFuture<'a, Option<UserRecord>> {
        (**self).find_by_id(user_id)
    }

    fn save<'a>(&'a self, user: &'a UserRecord) -> StoreResultFuture<'a, ()> {
        (**self).save(user)
    }
}

impl<T: AvatarStore + ?Sized> AvatarStore for Arc<T> {
    fn write_avatar<'a>(&'a self, user_id: &'a str, data: &'a [u8]) -> StoreResultFuture<'a, String> {
        (**self).write_avatar(user_id, data)
    }

    fn read_avatar<'a>(&'a self, path: &'a str) -> StoreResultFuture<'a, Vec<u8>> {
        (**self).read_avatar(path)
    }
}

/// Users as JSON documents under `users/`
#[derive(Clone)]
pub struct ObjectUserRepository<S: ObjectStore> {
    store: S,
    keys: StoreKeys,
}

impl<S: ObjectStore> ObjectUserRepository<S> {
    pub fn new(store: S, keys: StoreKeys) -> Self {
        ObjectUserRepository { store, keys }
    }
}

impl<S: ObjectStore> UserRepository for ObjectUserRepository<S> {
    fn find_by_id<'a>(&'a self, user_id: &'a str) -> StoreResultFuture<'a, Option<UserRecord>> {
        Box::pin(async move {
            match self.store.get(&self.keys.user(user_id)).await {
                Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StoreError::Io(e)),
            }
        })
    }

    fn save<'a>(&'a self, user: &'a UserRecord) -> StoreResultFuture<'a, ()> {
        Box::pin(async move {
            let data = serde_json::to_vec(user)?;
            self.store.put(&self.keys.user(&user.id), &data).await?;
            Ok(())
        })
    }
}

/// Avatars as raw objects under `avatars/`
#[derive(Clone)]
pub struct ObjectAvatarStore<S: ObjectStore> {
    store: S,
    keys: StoreKeys,
}

impl<S: ObjectStore> ObjectAvatarStore<S> {
    pub fn new(store: S, keys: StoreKeys) -> Self {
        ObjectAvatarStore { store, keys }
    }
}

impl<S: ObjectStore> AvatarStore for ObjectAvatarStore<S> {
    fn write_avatar<'a>(&'a self, user_id: &'a str, data: &'a [u8]) -> StoreResultFuture<'a, String> {
        Box::pin(async move {
            let path = self.keys.avatar(user_id);
            self.store.put(&path, data).await?;
            Ok(path)
        })
    }

    fn read_avatar<'a>(&'a self, path: &'a str) -> StoreResultFuture<'a, Vec<u8>> {
        Box::pin(async move { Ok(self.store.get(path).await?) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryObjectStore;

    #[tokio::test]
    async fn test_user_roundtrip_and_missing() {
        let inner = InMemoryObjectStore::new();
        let users = ObjectUserRepository::new(inner.clone(), StoreKeys::new(""));

        assert_eq!(users.find_by_id("u1").await.unwrap(), None);

        let user = UserRecord::new("u1", "Ada", "ada@example.com");
        users.save(&user).await.unwrap();

        assert_eq!(users.find_by_id("u1").await.unwrap(), Some(user));
        assert!(inner.snapshot("users/u1.json").is_some());
    }

    #[tokio::test]
    async fn test_avatar_path_layout() {
        let inner = InMemoryObjectStore::new();
        let avatars = ObjectAvatarStore::new(inner.clone(), StoreKeys::new("svc"));

        let path = avatars.write_avatar("u1", b"\x89PNG").await.unwrap();
        assert_eq!(path, "svc/avatars/u1_avatar.png");
        assert_eq!(avatars.read_avatar(&path).await.unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn test_read_missing_avatar_is_not_found() {
        let avatars = ObjectAvatarStore::new(InMemoryObjectStore::new(), StoreKeys::new(""));
        let err = avatars.read_avatar("avatars/none.png").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
