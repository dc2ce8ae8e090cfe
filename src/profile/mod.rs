//! User profiles and avatars

pub mod service;
pub mod store;

pub use service::{ProfileError, ProfileService, UserProfile};
pub use store::{
    AvatarStore, ObjectAvatarStore, ObjectUserRepository, UserRecord, UserRepository,
};
