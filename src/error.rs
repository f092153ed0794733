use std::fmt::Display;

use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use reqwest::Error as HttpError;
use rocket::{
    http::{Status, StatusClass},
    response::{content::RawJson, status::Custom, Responder},
    serde::json::serde_json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::model::api::validation::FieldErrors;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Language service request failed: {0}")]
    Upstream(#[from] HttpError),
    #[error("{1}")]
    Status(Status, String),
    #[error("Invalid submission: {0}")]
    Validation(FieldErrors),
}

impl Error {
    /// A 404 naming the thing that was not found.
    pub fn not_found(what: impl Display) -> Self {
        Self::Status(Status::NotFound, format!("{what} not found"))
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Argon2(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::Upstream(_) => Status::BadGateway,
            Self::Status(status, _) => *status,
            Self::Validation(_) => Status::UnprocessableEntity,
        }
    }
}

/// JSON body returned for every error.
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a FieldErrors>,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        match status.class() {
            StatusClass::ServerError => error!("{status}: {self}"),
            _ => debug!("{status}: {self}"),
        }
        // Internal details stay in the log.
        let message = if status.class() == StatusClass::ServerError {
            status.reason_lossy().to_string()
        } else {
            self.to_string()
        };
        let fields = match &self {
            Self::Validation(fields) => Some(fields),
            _ => None,
        };
        let body = ErrorBody {
            error: message,
            fields,
        };
        let json = serde_json::to_string(&body)
            .map_err(|_| Status::InternalServerError)?;
        Custom(status, RawJson(json)).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(Error::not_found("Survey 3").status(), Status::NotFound);
        assert_eq!(
            Error::Status(Status::Conflict, "taken".to_string()).status(),
            Status::Conflict
        );
        let mut fields = FieldErrors::default();
        fields.add("title", "required");
        assert_eq!(
            Error::Validation(fields).status(),
            Status::UnprocessableEntity
        );
        let expired: JwtError = JwtErrorKind::ExpiredSignature.into();
        assert_eq!(Error::from(expired).status(), Status::Unauthorized);
        let invalid: JwtError = JwtErrorKind::InvalidToken.into();
        assert_eq!(Error::from(invalid).status(), Status::BadRequest);
    }

    #[test]
    fn not_found_message() {
        assert_eq!(
            Error::not_found("Vote 42").to_string(),
            "Vote 42 not found"
        );
    }
}
