//! The mongodb crate doesn't provide error code constants, so the ones we
//! react to live here.

use mongodb::error::{
    Error as DbError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR,
};

pub const DUPLICATE_KEY: i32 = 11000;

/// Is this a violation of a unique index?
///
/// Inside a transaction the server reports the violation as a command error
/// rather than a write error, so both shapes are checked.
pub fn is_duplicate_key(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(ref e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Did a transaction lose a race with a concurrent write? Either the server
/// flagged a write conflict, or another transaction committed the same unique
/// key first. Such transactions can be run again from the start.
pub fn is_transaction_race(err: &DbError) -> bool {
    err.contains_label(TRANSIENT_TRANSACTION_ERROR) || is_duplicate_key(err)
}
