//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//!
//! Nothing is ever removed from the database; deletion sets `is_deleted`
//! and `deleted_at` instead.

use mongodb::bson::{doc, DateTime, Document};

pub mod survey;
pub mod tag;
pub mod user;
pub mod vote;

/// Filter fragment matching documents that have not been soft-deleted.
pub fn live() -> Document {
    doc! { "is_deleted": false }
}

/// Update document that soft-deletes at the given instant.
pub fn soft_delete(now: DateTime) -> Document {
    doc! {
        "$set": {
            "is_deleted": true,
            "deleted_at": now,
            "updated_at": now,
        }
    }
}
