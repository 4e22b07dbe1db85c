//! Mapping from store errors to gRPC statuses.

use imagevault::StoreError;
use tonic::Status;

/// Converts a store failure into the status surfaced to the client.
///
/// A download of an unknown name is the caller's mistake, not ours, so it
/// maps to `INVALID_ARGUMENT` with the offending name in the message.
pub(crate) fn store_status(err: StoreError) -> Status {
    match err {
        StoreError::NotFound { .. } => Status::invalid_argument(err.to_string()),
        // A sink whose receiver vanished means the caller went away.
        StoreError::Canceled | StoreError::SinkClosed => Status::cancelled("request is canceled"),
        StoreError::DeadlineExceeded => Status::deadline_exceeded("deadline is exceeded"),
        StoreError::Create { .. }
        | StoreError::Write { .. }
        | StoreError::Open { .. }
        | StoreError::Read { .. } => Status::internal(err.to_string()),
    }
}

/// Logs an error status server-side before handing it to the transport.
pub(crate) fn log_status(status: Status) -> Status {
    tracing::error!(code = ?status.code(), "{}", status.message());
    status
}
