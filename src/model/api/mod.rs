//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as hex strings.
//! - Datetimes are serialised as RFC 3339 strings.

pub mod auth;
pub mod comment;
pub mod id;
pub mod pagination;
pub mod survey;
pub mod tag;
pub mod validation;
pub mod vote;
