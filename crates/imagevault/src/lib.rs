//! Disk-backed image storage with a streaming send path.
//!
//! The crate provides the [`ImageStore`] capability consumed by the gRPC
//! front end: uploads arrive as a single in-memory buffer and are persisted
//! under `{image_folder}/{name}{ext}`, downloads stream back out through an
//! [`ImageSink`] (one header, then chunks), and the listing renders a
//! human-readable table of everything currently indexed.
//!
//! Handlers hold `Arc<dyn ImageStore>` rather than the concrete
//! [`DiskImageStore`], so tests can substitute an in-memory double.
//!
//! The index lives behind a single reader/writer lock: `save` takes it
//! exclusively for the file write plus index upsert, `send` and `list` take
//! it shared. A download started after an upload commits always observes
//! that upload, and concurrent downloads of one image do not serialize.

mod context;
mod disk;
mod error;
mod store;
mod table;

pub use context::CallContext;
pub use disk::{DiskImageStore, ImageRecord};
pub use error::StoreError;
pub use store::{ImageMeta, ImageSink, ImageStore};
