use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::errors::StoreError;
use super::model::{NewUser, User};

/// Page bound for both matching queries.
pub const MATCH_PAGE_SIZE: i64 = 10;

/// Primary store: the system of record for users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn save_user(&self, user: &NewUser) -> Result<(), StoreError>;
    async fn user_by_email(&self, email: &str) -> Result<User, StoreError>;
    async fn user_by_id(&self, id: Uuid) -> Result<User, StoreError>;
    /// Flips `is_email_verified` and returns the row as it is after the update.
    async fn verify_email(&self, id: Uuid) -> Result<User, StoreError>;
    async fn users_by_skills(&self, caller_id: Uuid, skills: &[String])
        -> Result<Vec<User>, StoreError>;
    async fn random_users(&self, caller_id: Uuid) -> Result<Vec<User>, StoreError>;
}

const USER_COLUMNS: &str = "id, email, name, password_hash, about, skills::text[] AS skills, \
                            avatar_key, is_email_verified";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn save_user(&self, user: &NewUser) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, about, skills, avatar_key)
            VALUES ($1, $2, $3, $4, $5, $6::text[]::skill[], $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&user.about)
        .bind(&user.skills)
        .bind(&user.avatar_key)
        .execute(&self.db)
        .await
        .map_err(|e| constraint_error(e, "insert user"))?;
        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .context("select user by email")?
            .ok_or(StoreError::NotFound)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("select user by id")?
            .ok_or(StoreError::NotFound)
    }

    async fn verify_email(&self, id: Uuid) -> Result<User, StoreError> {
        let query = format!(
            "UPDATE users SET is_email_verified = true WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("verify email")?
            .ok_or(StoreError::NotFound)
    }

    async fn users_by_skills(
        &self,
        caller_id: Uuid,
        skills: &[String],
    ) -> Result<Vec<User>, StoreError> {
        // Compared as text so an unknown skill just never matches.
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE is_email_verified AND id <> $1 AND skills::text[] && $2::text[] \
             LIMIT $3"
        );
        let users = sqlx::query_as::<_, User>(&query)
            .bind(caller_id)
            .bind(skills)
            .bind(MATCH_PAGE_SIZE)
            .fetch_all(&self.db)
            .await
            .context("select users by skills")?;
        Ok(users)
    }

    async fn random_users(&self, caller_id: Uuid) -> Result<Vec<User>, StoreError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE is_email_verified AND id <> $1 \
             ORDER BY random() \
             LIMIT $2"
        );
        let users = sqlx::query_as::<_, User>(&query)
            .bind(caller_id)
            .bind(MATCH_PAGE_SIZE)
            .fetch_all(&self.db)
            .await
            .context("select random users")?;
        Ok(users)
    }
}

fn constraint_error(err: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(mapped) = classify_sqlstate(db_err.code().as_deref()) {
            return mapped;
        }
    }
    StoreError::Other(anyhow::Error::new(err).context(what))
}

/// 23505 is unique_violation (email), 22P02 is invalid_text_representation,
/// raised when a skill does not cast to the `skill` enum.
fn classify_sqlstate(code: Option<&str>) -> Option<StoreError> {
    match code? {
        "23505" => Some(StoreError::AlreadyExists),
        "22P02" => Some(StoreError::InvalidSkill),
        _ => None,
    }
}
