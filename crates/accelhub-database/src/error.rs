//! Mapping of sqlx errors into [`AppError`].
//!
//! Errors that a retry can plausibly clear (pool exhaustion, dropped
//! connections, serialization failures, deadlocks, lock timeouts) map to
//! [`ErrorKind::ServiceUnavailable`]; everything else is
//! [`ErrorKind::Database`].

use accelhub_core::error::{AppError, ErrorKind};

/// PostgreSQL SQLSTATE codes treated as transient.
const TRANSIENT_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "57P01", // admin_shutdown
];

/// Whether a sqlx error is worth retrying.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => db
            .code()
            .as_deref()
            .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code)),
        _ => false,
    }
}

/// Wrap a sqlx error with context, classifying it as transient or not.
pub fn db_error(context: &str, err: sqlx::Error) -> AppError {
    let kind = if is_transient(&err) {
        ErrorKind::ServiceUnavailable
    } else {
        ErrorKind::Database
    };
    AppError::with_source(kind, context.to_string(), err)
}
