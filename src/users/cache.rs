use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use super::model::User;
use crate::retry::{retry_with_backoff, RetryConfig};

const KEY_PREFIX: &str = "user";
const BY_ID_PREFIX: &str = "user-by-id";
const BY_EMAIL_PREFIX: &str = "user-by-email";

/// Time-bounded mirror of user records. `Ok(None)` is a miss.
#[async_trait]
pub trait UserCache: Send + Sync {
    async fn save_user(&self, user: &User) -> anyhow::Result<()>;
    async fn user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Overwrites the entry, restarting its TTL.
    async fn update_user(&self, user: &User) -> anyhow::Result<()>;
}

/// One JSON value per user under `user:{id}:{email}`, plus `user-by-id:{id}`
/// and `user-by-email:{email}` pointers holding that record key, so either
/// lookup is two GETs. All three keys are written together with the same TTL
/// and are never deleted otherwise.
#[derive(Clone)]
pub struct RedisUserCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisUserCache {
    pub async fn connect(url: &str, ttl: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("parse redis url")?;
        let conn = retry_with_backoff(
            RetryConfig::default(),
            || ConnectionManager::new(client.clone()),
            "redis connect",
        )
        .await
        .context("connect to redis")?;
        Ok(Self { conn, ttl })
    }

    async fn write(&self, user: &User) -> anyhow::Result<()> {
        let value = serde_json::to_string(user).context("encode user for cache")?;
        let keys = EntryKeys::of(user.id, &user.email);
        let ttl = self.ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, val) in [
            (&keys.record, &value),
            (&keys.by_id, &keys.record),
            (&keys.by_email, &keys.record),
        ] {
            pipe.cmd("SET").arg(key).arg(val).arg("EX").arg(ttl).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .context("redis set user")?;
        Ok(())
    }

    /// Follows `pointer` to its record and keeps it only if `wanted` accepts it.
    async fn find(
        &self,
        pointer: &str,
        wanted: impl Fn(&User) -> bool + Send,
    ) -> anyhow::Result<Option<User>> {
        let mut conn = self.conn.clone();
        let record: Option<String> = redis::cmd("GET")
            .arg(pointer)
            .query_async(&mut conn)
            .await
            .context("redis get pointer")?;
        let Some(record) = record else {
            return Ok(None);
        };
        let raw: Option<String> = redis::cmd("GET")
            .arg(&record)
            .query_async(&mut conn)
            .await
            .context("redis get user")?;
        decode_match(&record, raw, wanted)
    }
}

#[async_trait]
impl UserCache for RedisUserCache {
    async fn save_user(&self, user: &User) -> anyhow::Result<()> {
        self.write(user).await
    }

    async fn user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.find(&by_email_key(email), |u| u.email == email).await
    }

    async fn user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        self.find(&by_id_key(id), |u| u.id == id).await
    }

    async fn update_user(&self, user: &User) -> anyhow::Result<()> {
        self.write(user).await
    }
}

/// Every key one cache entry occupies. Derived from id and email only, so a
/// rewrite of the same user lands on the same keys.
#[derive(Debug, PartialEq, Eq)]
struct EntryKeys {
    record: String,
    by_id: String,
    by_email: String,
}

impl EntryKeys {
    fn of(id: Uuid, email: &str) -> Self {
        Self {
            record: record_key(id, email),
            by_id: by_id_key(id),
            by_email: by_email_key(email),
        }
    }
}

fn record_key(id: Uuid, email: &str) -> String {
    format!("{KEY_PREFIX}:{id}:{email}")
}

fn by_id_key(id: Uuid) -> String {
    format!("{BY_ID_PREFIX}:{id}")
}

fn by_email_key(email: &str) -> String {
    format!("{BY_EMAIL_PREFIX}:{email}")
}

/// `None` raw means the record expired after its pointer was read: a miss.
/// A record `wanted` rejects is a miss too, not an error.
fn decode_match(
    key: &str,
    raw: Option<String>,
    wanted: impl Fn(&User) -> bool,
) -> anyhow::Result<Option<User>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let user: User =
        serde_json::from_str(&raw).with_context(|| format!("decode cached user at {key}"))?;
    Ok(wanted(&user).then_some(user))
}
