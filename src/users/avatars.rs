use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::storage::StorageClient;

const AVATAR_CONTENT_TYPE: &str = "image/png";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Uploads `avatar` under the user's id and returns the object key to
    /// persist. With no payload, returns the shared placeholder's key instead.
    async fn save_avatar(&self, id: Uuid, avatar: Option<Bytes>) -> anyhow::Result<String>;
    /// Signs a fresh, time-bounded link to the object under `key`.
    async fn avatar_url(&self, key: &str) -> anyhow::Result<String>;
}

/// Avatars live in the object store keyed by user id. Only keys are stored;
/// each read gets a newly presigned URL valid for `url_ttl`.
pub struct AvatarStore {
    storage: Arc<dyn StorageClient>,
    url_ttl: Duration,
    default_key: String,
}

impl AvatarStore {
    pub fn new(storage: Arc<dyn StorageClient>, url_ttl: Duration, default_key: String) -> Self {
        Self {
            storage,
            url_ttl,
            default_key,
        }
    }
}

#[async_trait]
impl BlobStore for AvatarStore {
    async fn save_avatar(&self, id: Uuid, avatar: Option<Bytes>) -> anyhow::Result<String> {
        let Some(body) = avatar else {
            return Ok(self.default_key.clone());
        };
        let key = id.to_string();
        self.storage
            .put_object(&key, body, AVATAR_CONTENT_TYPE)
            .await
            .with_context(|| format!("upload avatar {key}"))?;
        Ok(key)
    }

    async fn avatar_url(&self, key: &str) -> anyhow::Result<String> {
        self.storage
            .presign_get(key, self.url_ttl)
            .await
            .with_context(|| format!("presign avatar {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Stamps every signature with a generation so re-signed links differ.
    #[derive(Default)]
    struct FakeStorage {
        puts: Mutex<Vec<(String, usize, String)>>,
        signed: AtomicUsize,
    }

    #[async_trait]
    impl StorageClient for FakeStorage {
        async fn put_object(&self, k: &str, b: Bytes, ct: &str) -> anyhow::Result<()> {
            self.puts.lock().unwrap().push((k.into(), b.len(), ct.into()));
            Ok(())
        }
        async fn presign_get(&self, k: &str, ttl: Duration) -> anyhow::Result<String> {
            let generation = self.signed.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("https://fake.local/{}?ttl={}&gen={}", k, ttl.as_secs(), generation))
        }
    }

    fn store(storage: Arc<FakeStorage>) -> AvatarStore {
        AvatarStore::new(storage, Duration::from_secs(300), "avatar.png".into())
    }

    #[tokio::test]
    async fn missing_payload_resolves_to_placeholder_without_upload() {
        let storage = Arc::new(FakeStorage::default());
        let key = store(storage.clone())
            .save_avatar(Uuid::new_v4(), None)
            .await
            .unwrap();
        assert_eq!(key, "avatar.png");
        assert!(storage.puts.lock().unwrap().is_empty());
        assert_eq!(storage.signed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn payload_is_uploaded_under_user_id() {
        let storage = Arc::new(FakeStorage::default());
        let id = Uuid::new_v4();
        let key = store(storage.clone())
            .save_avatar(id, Some(Bytes::from_static(b"\x89PNG")))
            .await
            .unwrap();
        assert_eq!(key, id.to_string());
        let puts = storage.puts.lock().unwrap();
        assert_eq!(puts.as_slice(), &[(id.to_string(), 4, "image/png".to_string())]);
    }

    #[tokio::test]
    async fn every_url_request_signs_a_new_link() {
        let storage = Arc::new(FakeStorage::default());
        let avatars = store(storage.clone());
        let first = avatars.avatar_url("avatar.png").await.unwrap();
        let second = avatars.avatar_url("avatar.png").await.unwrap();
        assert_eq!(first, "https://fake.local/avatar.png?ttl=300&gen=1");
        assert_eq!(second, "https://fake.local/avatar.png?ttl=300&gen=2");
    }
}
