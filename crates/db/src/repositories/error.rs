//! Mapping of database errors onto store errors.

use sea_orm::{DbErr, RuntimeErr};

use kudos_core::store::StoreError;

/// SQLSTATE `serialization_failure`.
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

fn database_error(err: &DbErr) -> Option<&(dyn sqlx::error::DatabaseError + 'static)> {
    match err {
        DbErr::Conn(RuntimeErr::SqlxError(sqlx::Error::Database(db)))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db)))
        | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(db))) => Some(db.as_ref()),
        _ => None,
    }
}

/// Classifies a database error.
///
/// Both serialization failures and deadlocks abort the whole transaction,
/// so both are reported as retryable.
pub(crate) fn store_error(err: DbErr) -> StoreError {
    if let Some(db) = database_error(&err) {
        match db.code().as_deref() {
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => {
                return StoreError::SerializationFailure;
            }
            Some(UNIQUE_VIOLATION) => {
                let constraint = db.constraint().unwrap_or("unique").to_string();
                return StoreError::UniqueViolation(constraint);
            }
            _ => {}
        }
    }
    StoreError::Backend(err.to_string())
}
