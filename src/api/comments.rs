use rocket::{serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::api::{
        auth::AuthToken,
        comment::{CommentText, ModerationResult},
    },
    moderation::Moderator,
    RequestId,
};

pub fn routes() -> Vec<Route> {
    routes![check_comment, soften_comment]
}

/// Run text through the moderation pipeline without saving anything.
#[post("/comments/check", data = "<comment>", format = "json")]
pub async fn check_comment(
    _token: AuthToken,
    comment: Json<CommentText>,
    moderator: &State<Moderator>,
    request_id: &RequestId,
) -> Result<Json<ModerationResult>> {
    let verdict = moderator.check(&comment.text).await?;
    debug!("req{request_id}: comment verdict {verdict:?}");
    Ok(Json(verdict.into()))
}

/// Ask the language service for a gentler wording.
#[post("/comments/soften", data = "<comment>", format = "json")]
pub async fn soften_comment(
    _token: AuthToken,
    comment: Json<CommentText>,
    moderator: &State<Moderator>,
) -> Result<Json<CommentText>> {
    let text = moderator.soften(&comment.text).await?;
    Ok(Json(CommentText { text }))
}
