mod credentials;
mod token;

pub use credentials::{
    normalize_email, LoginRequest, SignupRequest, UserDescription, MAX_EMAIL_LENGTH,
    MAX_USER_NAME_LENGTH, MIN_PASSWORD_LENGTH,
};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
