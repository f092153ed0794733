use rocket::{http::Status, Catcher, Request, Route};

use crate::error::Error;

pub mod auth;
pub mod comments;
pub mod common;
pub mod surveys;
pub mod tags;
pub mod votes;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(surveys::routes());
    routes.extend(votes::routes());
    routes.extend(tags::routes());
    routes.extend(comments::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![json_error]
}

/// Failed guards and unmatched routes get the same JSON body as handler errors.
#[catch(default)]
fn json_error(status: Status, _req: &Request) -> Error {
    Error::Status(status, status.reason_lossy().to_string())
}
