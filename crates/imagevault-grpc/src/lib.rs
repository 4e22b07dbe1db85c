//! Image vault gRPC server.
//!
//! Exposes the [`imagevault`] store over three RPCs: a client-streaming
//! upload (header message first, then chunks, capped at 1 MiB), a
//! server-streaming download (header first, then chunks), and a unary call
//! returning a human-readable table of everything currently stored.
//!
//! # Example flow
//!
//! ```text
//! Client                                     Server
//! │                                            │
//! │  UploadImageRequest{info}                  │
//! │ ──────────────────────────────────────────>│
//! │  UploadImageRequest{chunk_data} …          │
//! │ ──────────────────────────────────────────>│
//! │  (close)                                   │ store.save(...)
//! │         UploadImageResponse{name, size}    │
//! │<────────────────────────────────────────── │
//! │                                            │
//! │  DownloadImageRequest{name}                │
//! │ ──────────────────────────────────────────>│
//! │         DownloadImageResponse{info}        │
//! │<────────────────────────────────────────── │
//! │         DownloadImageResponse{chunk_data} …│
//! │<────────────────────────────────────────── │
//! ```
//!
//! Every method sits behind a per-method concurrency gate
//! ([`MethodConcurrencyLayer`]): at most N invocations of one method are in
//! flight at a time, and excess callers wait for a slot.

pub mod proto {
    #![allow(missing_docs)]
    tonic::include_proto!("imagevault.v1");
}

mod context;
mod limit;
mod server;
mod status;

pub use limit::{MethodConcurrencyLayer, DEFAULT_METHOD_LIMIT};
pub use server::{ImageVaultServer, ImageVaultService, MAX_IMAGE_SIZE};

// Re-export the service endpoints for hosts and tests.
pub use proto::image_service_client::ImageServiceClient;
pub use proto::image_service_server::ImageServiceServer;
