use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::avatars::BlobStore;
use super::cache::UserCache;
use super::errors::ServiceError;
use super::model::{NewUser, User};
use super::password::hash_password;
use super::repo::UserStore;

/// Input of `UserService::create_user`, already validated by the handler.
#[derive(Debug)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub about: String,
    pub skills: Vec<String>,
    pub avatar: Option<Bytes>,
}

/// Orchestrates the primary store, the cache and the avatar blob store.
///
/// Reads are cache-aside: the cache is consulted first and filled from the
/// primary store on a miss. Writes go to the primary store only, except the
/// verification flag, which is pushed to the cache right after the store
/// update. A user is only exposed once their email is verified.
pub struct UserService {
    store: Arc<dyn UserStore>,
    cache: Arc<dyn UserCache>,
    blobs: Arc<dyn BlobStore>,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        cache: Arc<dyn UserCache>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            store,
            cache,
            blobs,
        }
    }

    #[instrument(skip(self, input), fields(email = %input.email, skills = ?input.skills))]
    pub async fn create_user(&self, input: CreateUser) -> Result<Uuid, ServiceError> {
        let CreateUser {
            email,
            name,
            password,
            about,
            skills,
            avatar,
        } = input;
        let id = Uuid::new_v4();

        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .context("password hashing task")
            .and_then(|hashed| hashed)
            .map_err(ServiceError::Internal)?;

        // The blob goes first so a stored user always points at an existing avatar.
        let avatar_key = self
            .blobs
            .save_avatar(id, avatar)
            .await
            .map_err(ServiceError::Internal)?;

        self.store
            .save_user(&NewUser {
                id,
                email,
                name,
                password_hash,
                about,
                skills,
                avatar_key,
            })
            .await?;

        info!(user_id = %id, "user created");
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn user_by_email(&self, email: &str) -> Result<User, ServiceError> {
        let user = match cache_lookup(self.cache.user_by_email(email).await) {
            Some(user) => verified(user)?,
            None => self.backfill(self.store.user_by_email(email).await?).await?,
        };
        self.with_avatar_url(user).await
    }

    #[instrument(skip(self))]
    pub async fn user_by_id(&self, id: Uuid) -> Result<User, ServiceError> {
        let user = match cache_lookup(self.cache.user_by_id(id).await) {
            Some(user) => verified(user)?,
            None => self.backfill(self.store.user_by_id(id).await?).await?,
        };
        self.with_avatar_url(user).await
    }

    /// Verifying twice is a no-op success.
    #[instrument(skip(self))]
    pub async fn verify_email(&self, id: Uuid) -> Result<(), ServiceError> {
        let user = self.mark_verified(id).await?;
        info!(user_id = %user.id, "email verified");
        Ok(())
    }

    /// `None` asks for a random recommendation; `Some` filters by skills, even when empty.
    #[instrument(skip(self))]
    pub async fn users_by_skills(
        &self,
        caller_id: Uuid,
        skills: Option<&[String]>,
    ) -> Result<Vec<User>, ServiceError> {
        let users = match skills {
            Some(skills) => self.store.users_by_skills(caller_id, skills).await?,
            None => self.store.random_users(caller_id).await?,
        };
        let mut resolved = Vec::with_capacity(users.len());
        for user in users {
            resolved.push(self.with_avatar_url(user).await?);
        }
        Ok(resolved)
    }

    /// The only writer of `is_email_verified`: primary store first, then the
    /// cache entry is overwritten with the returned row.
    async fn mark_verified(&self, id: Uuid) -> Result<User, ServiceError> {
        let user = self.store.verify_email(id).await?;
        self.cache
            .update_user(&user)
            .await
            .map_err(ServiceError::CacheOutOfSync)?;
        Ok(user)
    }

    async fn backfill(&self, user: User) -> Result<User, ServiceError> {
        let user = verified(user)?;
        if let Err(e) = self.cache.save_user(&user).await {
            warn!(user_id = %user.id, error = ?e, "cache fill failed");
        }
        Ok(user)
    }

    /// Records hold the avatar's object key; the link is signed per response
    /// so it never outlives its signature in storage or in the cache.
    async fn with_avatar_url(&self, mut user: User) -> Result<User, ServiceError> {
        user.avatar_url = self
            .blobs
            .avatar_url(&user.avatar_key)
            .await
            .map_err(ServiceError::Internal)?;
        Ok(user)
    }
}

/// A failing cache degrades to a miss.
fn cache_lookup(result: anyhow::Result<Option<User>>) -> Option<User> {
    match result {
        Ok(hit) => hit,
        Err(e) => {
            warn!(error = ?e, "cache read failed, falling back to primary store");
            None
        }
    }
}

fn verified(user: User) -> Result<User, ServiceError> {
    if user.is_email_verified {
        Ok(user)
    } else {
        Err(ServiceError::EmailNotVerified)
    }
}
