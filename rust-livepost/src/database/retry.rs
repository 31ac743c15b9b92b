//! Retry helpers for database operations.

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use crate::utils::retry::{Backoff, retry_with};
use crate::{Error, Result};

const SQLITE_BUSY_BACKOFF: Backoff =
    Backoff::new(12, Duration::from_millis(10), Duration::from_millis(2000));

/// SQLITE_BUSY (5) or SQLITE_LOCKED (6), by code or by message.
pub fn is_sqlite_busy_error(err: &Error) -> bool {
    let Error::DatabaseSqlx(sqlx_err) = err else {
        return false;
    };

    let sqlx::Error::Database(db_err) = sqlx_err else {
        let msg = sqlx_err.to_string().to_ascii_lowercase();
        return msg.contains("database is locked") || msg.contains("database is busy");
    };

    let code = db_err.code().map(Cow::into_owned);
    if matches!(code.as_deref(), Some("5") | Some("6")) {
        return true;
    }

    let msg = db_err.message().to_ascii_lowercase();
    msg.contains("database is locked") || msg.contains("database is busy")
}

pub async fn retry_on_sqlite_busy<T, F, Fut>(op_name: &'static str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with(op_name, SQLITE_BUSY_BACKOFF, is_sqlite_busy_error, op).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_detection_ignores_other_errors() {
        assert!(!is_sqlite_busy_error(&Error::validation("x")));
        assert!(!is_sqlite_busy_error(&Error::DatabaseSqlx(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_busy_detection_by_message() {
        let err = Error::DatabaseSqlx(sqlx::Error::Protocol("database is locked".into()));
        assert!(is_sqlite_busy_error(&err));
    }
}
