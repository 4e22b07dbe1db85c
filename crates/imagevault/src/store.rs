//! The polymorphic image-store capability.

use std::time::SystemTime;

use async_trait::async_trait;

use crate::{CallContext, StoreError};

/// Metadata describing one stored image, as carried in a download header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    /// Logical image name (the index key).
    pub name: String,
    /// Filename extension doubling as the content-type hint, e.g. `.jpeg`.
    pub ext: String,
    /// Timestamp from the most recent accepted upload.
    pub updated_at: SystemTime,
}

/// Receives the header and chunks of an image being sent.
///
/// The indirection keeps the store ignorant of the transport: the gRPC
/// layer wraps each call in a response message, tests collect into memory.
#[async_trait]
pub trait ImageSink: Send {
    /// Called exactly once, before any chunk.
    async fn info(&mut self, meta: &ImageMeta) -> Result<(), StoreError>;

    /// Called once per chunk, in file order.
    async fn chunk(&mut self, data: &[u8]) -> Result<(), StoreError>;
}

/// Capability set of the image store: save, send, list.
///
/// Handlers depend on this trait, never on a concrete store.
#[async_trait]
pub trait ImageStore: Send + Sync + 'static {
    /// Persists `data` under `{image_folder}/{name}{ext}` and upserts the
    /// index entry, preserving `created_at` across re-uploads. The index is
    /// only touched after the bytes are on disk.
    ///
    /// Returns the stored name. `data` is already bounded by the caller.
    async fn save(
        &self,
        name: &str,
        ext: &str,
        data: Vec<u8>,
        updated_at: SystemTime,
    ) -> Result<String, StoreError>;

    /// Streams the named image through `sink`: one header, then chunks
    /// until end of file, re-checking `ctx` between every read and send.
    ///
    /// Holds a shared lock for the whole send so the record, the file and
    /// the emitted header stay consistent for the download's duration.
    async fn send(
        &self,
        name: &str,
        sink: &mut dyn ImageSink,
        ctx: &CallContext,
    ) -> Result<(), StoreError>;

    /// Renders the uploaded-images table with at most `limit` data rows.
    /// A `limit` of zero means all.
    async fn list(&self, limit: u32) -> String;
}
