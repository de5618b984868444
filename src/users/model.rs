use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User record as stored in Postgres and mirrored into the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String, // argon2 PHC string, never the raw password
    pub about: String,
    pub skills: Vec<String>,
    /// Object key of the avatar; the signed link is minted per read.
    pub avatar_key: String,
    pub is_email_verified: bool,
    /// Filled by `UserService` on the way out, never stored or cached.
    #[sqlx(skip)]
    #[serde(skip)]
    pub avatar_url: String,
}

/// Everything `UserStore::save_user` needs to insert a fresh row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub about: String,
    pub skills: Vec<String>,
    pub avatar_key: String,
}
