use std::ops::{Deref, DerefMut};

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core user account data.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    /// Normalised login email, unique among live accounts.
    pub email: String,
    /// Display name.
    pub user_name: String,
    pub password_hash: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime>,
}

impl UserCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // A malformed hash can only come from outside the signup path; treat it as a mismatch.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }
}

/// A user without an ID.
pub type NewUser = UserCore;

/// A user from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl UserCore {
        /// Matches `SignupRequest::example()`; the password is "karakuchi".
        pub fn example() -> Self {
            Self::with_email("hanako@example.com", "Hanako")
        }

        /// Matches `SignupRequest::example2()`; the password is "karakuchi".
        pub fn example2() -> Self {
            Self::with_email("taro@example.com", "Taro")
        }

        fn with_email(email: &str, user_name: &str) -> Self {
            let now = DateTime::now();
            Self {
                email: email.to_string(),
                user_name: user_name.to_string(),
                password_hash: argon2::hash_encoded(
                    b"karakuchi",
                    b"somesaltsomesalt",
                    &argon2::Config::default(),
                )
                .unwrap(),
                created_at: now,
                updated_at: now,
                is_deleted: false,
                deleted_at: None,
            }
        }
    }
}
