use serde::{Deserialize, Serialize};

/// A user row as stored by a [`UserRepository`](crate::repository::UserRepository).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// bcrypt hash, never serialized
    pub password_hash: String,
    pub nickname: String,
    /// Soft-delete flag. Only live rows take part in uniqueness checks.
    pub deleted: bool,
    /// Unix milliseconds
    pub created_at: u64,
    /// Unix milliseconds
    pub updated_at: u64,
}

impl User {
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: mask_username(&self.username),
            nickname: self.nickname.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Keeps the first and last character and stars out the rest:
/// `testuser` -> `t******r`, `ab` -> `a*`.
pub fn mask_username(username: &str) -> String {
    let chars: Vec<char> = username.chars().collect();
    match chars.len() {
        0 | 1 => username.to_string(),
        2 => format!("{}*", chars[0]),
        n => {
            let mut masked = String::with_capacity(n);
            masked.push(chars[0]);
            masked.extend(std::iter::repeat_n('*', n - 2));
            masked.push(chars[n - 1]);
            masked
        }
    }
}

/// Values for a row that has not been inserted yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub nickname: String,
    pub created_at: u64,
}

/// The outward view of a user. The username is masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub nickname: String,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl UpdateUserRequest {
    pub fn is_empty(&self) -> bool {
        self.nickname.is_none() && self.password.is_none()
    }
}
