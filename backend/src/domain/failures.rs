//! Translation of port errors into domain errors.

use tracing::error;

use super::compensation::at_step;
use super::ports::{ConnectivityClientError, RecordStoreError, TrackingClientError};
use super::Error;

/// Store failure on a path that has not mutated anything yet.
pub(crate) fn store_failure(err: RecordStoreError) -> Error {
    error!(error = %err, "record store read failed");
    match err {
        RecordStoreError::Connection { .. } => Error::service_unavailable("record store unavailable"),
        _ => Error::internal("record store query failed"),
    }
}

/// Store failure after remote systems were changed.
pub(crate) fn persistence_failure(err: &RecordStoreError) -> Error {
    error!(error = %err, "local write failed after remote mutation");
    Error::persistence_failed("local record store write failed")
}

pub(crate) fn remote_failure(step: &str, err: &TrackingClientError) -> Error {
    at_step(Error::remote_sync_failed(err.to_string()), step)
}

pub(crate) fn connectivity_failure(step: &str, err: &ConnectivityClientError) -> Error {
    at_step(Error::remote_sync_failed(err.to_string()), step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(RecordStoreError::connection("refused"), ErrorCode::ServiceUnavailable)]
    #[case(RecordStoreError::query("syntax"), ErrorCode::InternalError)]
    #[case(RecordStoreError::missing("users 7"), ErrorCode::InternalError)]
    fn store_reads_map_by_kind(#[case] err: RecordStoreError, #[case] expected: ErrorCode) {
        assert_eq!(store_failure(err).code(), expected);
    }

    #[rstest]
    fn remote_failures_name_the_step() {
        let err = remote_failure("create remote user", &TrackingClientError::timeout("5s"));
        assert_eq!(err.code(), ErrorCode::RemoteSyncFailed);
        assert_eq!(
            err.details().and_then(|d| d.get("failedStep")),
            Some(&serde_json::json!("create remote user"))
        );
    }
}
