use mongodb::{bson::doc, options::FindOptions};
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        api::tag::TagDescription,
        db::{live, tag::Tag},
        mongodb::Coll,
    },
};

pub fn routes() -> Vec<Route> {
    routes![list_tags]
}

/// Every live tag, alphabetical.
#[get("/tags")]
pub async fn list_tags(tags: Coll<Tag>) -> Result<Json<Vec<TagDescription>>> {
    let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
    let tags: Vec<TagDescription> = tags
        .find(live(), options)
        .await?
        .map_ok(TagDescription::from)
        .try_collect()
        .await?;
    Ok(Json(tags))
}
