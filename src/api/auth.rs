use mongodb::bson::{doc, DateTime};
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::auth::{
            normalize_email, AuthToken, LoginRequest, SignupRequest, UserDescription,
            AUTH_TOKEN_COOKIE,
        },
        db::{
            live, soft_delete,
            user::{NewUser, User},
        },
        mongodb::{is_duplicate_key, Coll, Id},
    },
    Config,
};

use super::common::current_user;

pub fn routes() -> Vec<Route> {
    routes![signup, login, logout, me, delete_account]
}

fn email_taken() -> Error {
    Error::Status(
        Status::Conflict,
        "An account with this email address already exists.".to_string(),
    )
}

#[post("/auth/signup", data = "<request>", format = "json")]
pub async fn signup(
    request: Json<SignupRequest>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
    config: &State<Config>,
) -> Result<Json<UserDescription>> {
    let user: NewUser = request.0.try_into()?;

    let mut with_email = doc! { "email": &user.email };
    with_email.extend(live());
    if users.find_one(with_email, None).await?.is_some() {
        return Err(email_taken());
    }

    // The unique index catches a concurrent signup with the same email.
    let new_id: Id = match new_users.insert_one(&user, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB
            .into(),
        Err(e) if is_duplicate_key(&e) => return Err(email_taken()),
        Err(e) => return Err(e.into()),
    };
    let user = User { id: new_id, user };
    info!("New account {new_id}");

    cookies.add_private(AuthToken::new(&user).into_cookie(config)?);
    Ok(Json(user.into()))
}

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn login(
    credentials: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<UserDescription>> {
    let unknown = || {
        Error::Status(
            Status::Unauthorized,
            "No account found with the provided email and password combination.".to_string(),
        )
    };
    let email = normalize_email(&credentials.email).ok_or_else(unknown)?;

    let mut with_email = doc! { "email": email };
    with_email.extend(live());
    let user = users
        .find_one(with_email, None)
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or_else(unknown)?;

    cookies.add_private(AuthToken::new(&user).into_cookie(config)?);
    Ok(Json(user.into()))
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove_private(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}

#[get("/auth/me")]
pub async fn me(token: AuthToken, users: Coll<User>) -> Result<Json<UserDescription>> {
    let user = current_user(&token, &users).await?;
    Ok(Json(user.into()))
}

/// Soft-delete the signed-in account. Its surveys and votes are left alone.
#[delete("/users/me")]
pub async fn delete_account(
    token: AuthToken,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
) -> Result<()> {
    let mut filter = token.id.as_doc();
    filter.extend(live());
    let result = users
        .update_one(filter, soft_delete(DateTime::now()), None)
        .await?;
    if result.modified_count == 0 {
        return Err(Error::not_found(format!("User {}", token.id)));
    }
    warn!("Account {} deleted", token.id);

    cookies.remove_private(Cookie::named(AUTH_TOKEN_COOKIE));
    Ok(())
}
