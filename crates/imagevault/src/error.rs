//! Error taxonomy for store operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by [`ImageStore`](crate::ImageStore) operations.
///
/// The messages are what clients see; the gRPC layer only picks the status
/// kind.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No image with the requested name is indexed.
    #[error("image doesn't exist: {name}")]
    NotFound {
        /// The logical name that was asked for.
        name: String,
    },
    /// The caller's context was cancelled.
    #[error("request is canceled")]
    Canceled,
    /// The caller's deadline expired.
    #[error("deadline is exceeded")]
    DeadlineExceeded,
    /// The image file could not be created.
    #[error("cannot create image file {}: {}", .path.display(), .source)]
    Create {
        /// Target path of the failed create.
        path: PathBuf,
        /// Underlying filesystem error.
        source: io::Error,
    },
    /// The image bytes could not be written out.
    #[error("cannot write image to file {}: {}", .path.display(), .source)]
    Write {
        /// Target path of the failed write.
        path: PathBuf,
        /// Underlying filesystem error.
        source: io::Error,
    },
    /// The image file could not be opened for sending.
    #[error("cannot open image file {}: {}", .path.display(), .source)]
    Open {
        /// Path recorded in the index.
        path: PathBuf,
        /// Underlying filesystem error.
        source: io::Error,
    },
    /// A chunk could not be read from the image file.
    #[error("cannot read chunk to buffer: {source}")]
    Read {
        /// Underlying filesystem error.
        source: io::Error,
    },
    /// The receiving side of a send went away mid-stream.
    #[error("chunk sink closed")]
    SinkClosed,
}
