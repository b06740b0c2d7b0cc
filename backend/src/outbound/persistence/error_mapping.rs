//! Diesel and pool failures translated into `RecordStoreError`.

use tracing::debug;

use super::pool::PoolError;
use crate::domain::ports::RecordStoreError;

pub(super) fn map_pool_error(error: PoolError) -> RecordStoreError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            RecordStoreError::connection(message)
        }
    }
}

pub(super) fn map_diesel_error(error: diesel::result::Error) -> RecordStoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => RecordStoreError::missing("record not found"),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            RecordStoreError::unique_violation(info.constraint_name().unwrap_or("unique constraint"))
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            RecordStoreError::connection("database connection error")
        }
        DieselError::QueryBuilderError(_) => RecordStoreError::query("database query error"),
        _ => RecordStoreError::query("database error"),
    }
}

/// Stored rows the domain refuses to load are query faults, not panics.
pub(super) fn map_row_error(message: String) -> RecordStoreError {
    tracing::error!(%message, "stored row failed validation");
    RecordStoreError::query(message)
}

/// Updates that touch no row target a record that no longer exists.
pub(super) fn expect_one_row(affected: usize, what: &str) -> Result<(), RecordStoreError> {
    if affected == 0 {
        Err(RecordStoreError::missing(what.to_owned()))
    } else {
        Ok(())
    }
}
