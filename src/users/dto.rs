use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::User;
use super::services::CreateUser;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Request body for user creation. Every field defaults so a missing one is
/// reported as a validation error rather than a JSON rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(default)]
    pub avatar: Option<serde_bytes::ByteBuf>,
}

impl CreateUserRequest {
    pub fn validate(self) -> Result<CreateUser, String> {
        let email = normalize_email(&self.email);
        if email.is_empty() {
            return Err("email is required".into());
        }
        if !is_valid_email(&email) {
            return Err("invalid email".into());
        }
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if self.password.is_empty() {
            return Err("password is required".into());
        }
        let skills = self.skills.ok_or_else(|| "skills is required".to_string())?;
        let avatar = self
            .avatar
            .map(|buf| Bytes::from(buf.into_vec()))
            .filter(|b| !b.is_empty());

        Ok(CreateUser {
            email,
            name: self.name.trim().to_string(),
            password: self.password,
            about: self.about,
            skills,
            avatar,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub id: Uuid,
}

/// `skills: null` (or absent) asks for random recommendations.
#[derive(Debug, Default, Deserialize)]
pub struct UsersBySkillsRequest {
    #[serde(default)]
    pub skills: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub about: String,
    pub skills: Vec<String>,
    pub avatar_url: String,
    pub is_email_verified: bool,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            password_hash: u.password_hash,
            about: u.about,
            skills: u.skills,
            avatar_url: u.avatar_url,
            is_email_verified: u.is_email_verified,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<UserResponse>,
}
