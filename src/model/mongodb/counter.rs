use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

/// ID of the counter that hands out survey IDs.
pub const SURVEY_ID_COUNTER_ID: &str = "survey_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u64,
}

impl Counter {
    /// Create a new `Counter` with the given ID, starting at the given value.
    pub fn new(id: impl Into<String>, start: u64) -> Self {
        Self {
            id: id.into(),
            next: start,
        }
    }

    /// Atomically retrieve the next value of the counter with the given ID.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<u64> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options: FindOneAndUpdateOptions = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?
            .ok_or_else(|| {
                Error::Status(
                    Status::InternalServerError,
                    format!("Failed to find counter with ID {}", id),
                )
            })?;
        Ok(counter.next)
    }

    /// Atomically retrieve the next value of the counter with the given ID,
    /// narrowed to a `u32`.
    pub async fn next_u32(counters: &Coll<Counter>, id: &str) -> Result<u32> {
        let next = Self::next(counters, id).await?;
        u32::try_from(next).map_err(|_| {
            Error::Status(
                Status::InternalServerError,
                format!("Counter {} overflowed", id),
            )
        })
    }
}

/// Ensure the global survey ID counter exists, creating it starting at 1 if not.
///
/// This operation is idempotent and never resets an existing counter.
pub async fn ensure_survey_id_counter_exists(counters: &Coll<Counter>) -> Result<(), DbError> {
    let filter = doc! { "_id": SURVEY_ID_COUNTER_ID };
    let update = doc! {
        "$setOnInsert": { "next": 1_i64 }
    };
    let options = UpdateOptions::builder().upsert(true).build();
    counters.update_one(filter, update, options).await?;
    Ok(())
}
