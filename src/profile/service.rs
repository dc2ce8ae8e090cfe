//! Profile handlers
//!
//! Profiles are cached under the user id. Every write that changes what
//! `get_profile` would return invalidates that same key.
//!
//! Cache fills and writes for one user run under that user's lock, so a
//! fill can never land after a newer write's invalidation, and two writes
//! never read-modify-write the same record at once.

use super::store::{AvatarStore, UserRecord, UserRepository};
use crate::cache::{BoundedCache, CacheStats};
use crate::clock::{Clock, ProductionClock};
use crate::locks::KeyLocks;
use crate::storage::StoreError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Profile as returned to callers; `avatar` is base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("invalid user id")]
    InvalidUserId,

    #[error("user not found: {0}")]
    NotFound(String),

    #[error("no file data")]
    EmptyFile,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ProfileService<U: UserRepository, A: AvatarStore, C: Clock = ProductionClock> {
    users: U,
    avatars: A,
    cache: BoundedCache<String, UserProfile, C>,
    locks: KeyLocks,
}

impl<U: UserRepository, A: AvatarStore, C: Clock> ProfileService<U, A, C> {
    pub fn new(users: U, avatars: A, cache: BoundedCache<String, UserProfile, C>) -> Self {
        ProfileService {
            users,
            avatars,
            cache,
            locks: KeyLocks::new(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Load a profile with its avatar inlined
    pub async fn get_profile(&self, user_id: &str) -> Result<UserProfile, ProfileError> {
        let user_id = validate_user_id(user_id)?;

        if let Some(profile) = self.cache.get(&user_id.to_string()) {
            debug!("Profile cache hit for user {}", user_id);
            return Ok(profile);
        }

        let _guard = self.locks.lock(user_id).await;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ProfileError::NotFound(user_id.to_string()))?;

        let avatar = match &user.avatar_path {
            Some(path) => match self.avatars.read_avatar(path).await {
                Ok(bytes) => Some(STANDARD.encode(bytes)),
                Err(e) => {
                    warn!("Unreadable avatar {} for user {}: {}", path, user_id, e);
                    None
                }
            },
            None => None,
        };

        let profile = UserProfile {
            id: user.id,
            name: user.name,
            email: user.email,
            avatar,
        };
        self.cache.insert(user_id.to_string(), profile.clone());
        Ok(profile)
    }

    /// Create or update name and email; an existing avatar is kept
    pub async fn update_profile(
        &self,
        user_id: &str,
        name: &str,
        email: &str,
    ) -> Result<(), ProfileError> {
        let user_id = validate_user_id(user_id)?;
        let _guard = self.locks.lock(user_id).await;

        let user = match self.users.find_by_id(user_id).await? {
            Some(mut existing) => {
                existing.name = name.to_string();
                existing.email = email.to_string();
                existing
            }
            None => UserRecord::new(user_id, name, email),
        };

        self.users.save(&user).await?;
        self.cache.invalidate(&user_id.to_string());
        Ok(())
    }

    /// Store a new avatar and point the user at it
    ///
    /// Returns the avatar path only after both the file and the user record
    /// are persisted.
    pub async fn upload_avatar(&self, user_id: &str, data: &[u8]) -> Result<String, ProfileError> {
        let user_id = validate_user_id(user_id)?;
        if data.is_empty() {
            return Err(ProfileError::EmptyFile);
        }
        let _guard = self.locks.lock(user_id).await;

        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ProfileError::NotFound(user_id.to_string()))?;

        let path = self.avatars.write_avatar(user_id, data).await?;
        user.avatar_path = Some(path.clone());
        self.users.save(&user).await?;

        self.cache.invalidate(&user_id.to_string());
        debug!("Stored avatar for user {} at {}", user_id, path);
        Ok(path)
    }
}

fn validate_user_id(user_id: &str) -> Result<&str, ProfileError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        Err(ProfileError::InvalidUserId)
    } else {
        Ok(trimmed)
    }
}
