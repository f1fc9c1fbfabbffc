pub mod group;
pub mod tag;
pub mod user;
pub mod vm;

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// A write was rejected by a UNIQUE or primary key constraint.
///
/// Carries the message shown to the caller, so a lost check-then-insert
/// race still reads as a conflict.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DuplicateRecord(pub String);

/// Turns a unique violation into [`DuplicateRecord`] and adds `context` to
/// every other database error.
pub fn write_error(
    err: DbErr,
    context: &'static str,
    describe: impl FnOnce(&str) -> String,
) -> anyhow::Error {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            DuplicateRecord(describe(&detail)).into()
        }
        _ => anyhow::Error::new(err).context(context),
    }
}

#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
