use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::storage::{Storage, StorageClient};
use crate::users::avatars::AvatarStore;
use crate::users::cache::RedisUserCache;
use crate::users::repo::PgUserStore;
use crate::users::services::UserService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<UserService>,
}

impl AppState {
    /// Connects every backing store and wires the user service on top of them.
    /// The pool is returned as well so `main` can run migrations on it.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let config = Arc::new(config);

        let db = crate::db::connect(&config.database).await?;

        let cache = RedisUserCache::connect(
            &config.cache.redis_url,
            Duration::from_secs(config.cache.ttl_secs),
        )
        .await?;

        let storage = Storage::new(&config.minio).await?;
        storage.ensure_bucket().await.context("prepare avatar bucket")?;
        let avatars = AvatarStore::new(
            Arc::new(storage) as Arc<dyn StorageClient>,
            Duration::from_secs(config.minio.avatar_url_ttl_secs),
            config.minio.default_avatar_key.clone(),
        );

        let users = Arc::new(UserService::new(
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(cache),
            Arc::new(avatars),
        ));

        Ok((Self::from_parts(config, users), db))
    }

    pub fn from_parts(config: Arc<AppConfig>, users: Arc<UserService>) -> Self {
        Self { config, users }
    }
}
