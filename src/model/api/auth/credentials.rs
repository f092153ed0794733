use argon2::Config;
use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{
    api::{
        id::ApiId,
        validation::{required_text, FieldErrors},
    },
    db::user::{NewUser, User},
};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_USER_NAME_LENGTH: usize = 50;
pub const MAX_EMAIL_LENGTH: usize = 255;

/// A request to open a new account. The password is plaintext and is never stored.
#[derive(Clone, Deserialize, Serialize)]
pub struct SignupRequest {
    pub user_name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Raw login credentials, received from a user.
#[derive(Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Normalise an email address: surrounding whitespace is dropped and the
/// domain part is lower-cased. Returns `None` if it doesn't look like an
/// address at all.
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim();
    let (local, domain) = email.rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    if !domain.contains('.') || email.chars().any(char::is_whitespace) {
        return None;
    }
    Some(format!("{}@{}", local, domain.to_lowercase()))
}

impl TryFrom<SignupRequest> for NewUser {
    type Error = Error;

    /// Convert a [`SignupRequest`] to a new [`User`] by hashing the password.
    /// Email uniqueness is left to the caller, since it needs the database.
    fn try_from(request: SignupRequest) -> Result<Self, Self::Error> {
        let mut errors = FieldErrors::default();

        let user_name = required_text(
            &mut errors,
            "user_name",
            &request.user_name,
            MAX_USER_NAME_LENGTH,
        );

        let email = match normalize_email(&request.email) {
            Some(email) if email.chars().count() <= MAX_EMAIL_LENGTH => email,
            Some(_) => {
                errors.add(
                    "email",
                    format!("Ensure this value has at most {MAX_EMAIL_LENGTH} characters."),
                );
                String::new()
            }
            None => {
                errors.add("email", "Enter a valid email address.");
                String::new()
            }
        };

        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.add(
                "password",
                format!("Passwords must contain at least {MIN_PASSWORD_LENGTH} characters."),
            );
        }
        if request.password != request.password_confirmation {
            errors.add("password_confirmation", "The two password fields didn't match.");
        }
        errors.into_result()?;

        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash =
            argon2::hash_encoded(request.password.as_bytes(), &salt, &Config::default())?;

        let now = BsonDateTime::now();
        Ok(Self {
            email,
            user_name,
            password_hash,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        })
    }
}

/// A user's own profile, as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescription {
    pub id: ApiId,
    pub user_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserDescription {
    fn from(user: User) -> Self {
        Self {
            id: user.id.into(),
            user_name: user.user.user_name,
            email: user.user.email,
            created_at: user.user.created_at.to_chrono(),
        }
    }
}
