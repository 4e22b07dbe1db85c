//! gRPC handlers for the image service, plus the server host.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};

use imagevault::{ImageMeta, ImageSink, ImageStore, StoreError};

use crate::context::call_context;
use crate::limit::MethodConcurrencyLayer;
use crate::proto::{
    self, download_image_response, upload_image_request, DownloadImageRequest,
    DownloadImageResponse, GetUploadedImagesTableStringRequest,
    GetUploadedImagesTableStringResponse, UploadImageRequest, UploadImageResponse,
};
use crate::status::{log_status, store_status};

/// Hard cap on the bytes of a single uploaded image.
pub const MAX_IMAGE_SIZE: usize = 1 << 20;

/// The image gRPC service: streaming upload, streaming download, listing.
///
/// Holds the store as a capability so tests can substitute a double.
#[derive(Clone)]
pub struct ImageVaultService {
    store: Arc<dyn ImageStore>,
}

impl ImageVaultService {
    /// Service backed by the given store.
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for ImageVaultService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageVaultService").finish_non_exhaustive()
    }
}

type DownloadStream = Pin<Box<dyn Stream<Item = Result<DownloadImageResponse, Status>> + Send>>;

#[tonic::async_trait]
impl proto::image_service_server::ImageService for ImageVaultService {
    async fn upload_image(
        &self,
        request: Request<Streaming<UploadImageRequest>>,
    ) -> Result<Response<UploadImageResponse>, Status> {
        let ctx = call_context(request.metadata());
        let mut stream = request.into_inner();

        // The stream must open with the image header.
        let info = match stream.message().await {
            Ok(Some(UploadImageRequest {
                data: Some(upload_image_request::Data::Info(info)),
            })) => info,
            _ => return Err(log_status(Status::unknown("cannot receive image info"))),
        };

        let name = info.name;
        let ext = info.r#type;
        validate_upload_header(&name, &ext)?;

        let updated_at = info
            .updated_at
            .and_then(|ts| SystemTime::try_from(ts).ok())
            .unwrap_or_else(SystemTime::now);

        tracing::info!(name = %name, ext = %ext, "received an upload-image request");

        let mut image_data = Vec::new();
        loop {
            ctx.check().map_err(|err| log_status(store_status(err)))?;

            tracing::debug!("waiting to receive more data");

            let chunk = match stream.message().await {
                Ok(Some(UploadImageRequest {
                    data: Some(upload_image_request::Data::ChunkData(chunk)),
                })) => chunk,
                Ok(None) => break,
                Ok(Some(_)) => {
                    return Err(log_status(Status::unknown(
                        "expected chunk data after image info",
                    )))
                }
                Err(err) => {
                    return Err(log_status(Status::unknown(format!(
                        "cannot receive chunk data: {err}"
                    ))))
                }
            };

            tracing::debug!(size = chunk.len(), "received a chunk");

            let total = image_data.len() + chunk.len();
            if total > MAX_IMAGE_SIZE {
                return Err(log_status(Status::invalid_argument(format!(
                    "image is too large: {total} > {MAX_IMAGE_SIZE}"
                ))));
            }
            image_data.extend_from_slice(&chunk);
        }

        let size = image_data.len() as u32;
        let name = self
            .store
            .save(&name, &ext, image_data, updated_at)
            .await
            .map_err(|err| {
                log_status(Status::internal(format!(
                    "cannot save image to the store: {err}"
                )))
            })?;

        tracing::info!(name = %name, size, "saved image");

        Ok(Response::new(UploadImageResponse { name, size }))
    }

    type DownloadImageStream = DownloadStream;

    async fn download_image(
        &self,
        request: Request<DownloadImageRequest>,
    ) -> Result<Response<Self::DownloadImageStream>, Status> {
        let ctx = call_context(request.metadata());
        let name = request.into_inner().name;

        tracing::info!(name = %name, "received a download-image request");

        let (tx, rx) = mpsc::channel(16);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let mut sink = ChannelSink { tx: tx.clone() };
            if let Err(err) = store.send(&name, &mut sink, &ctx).await {
                // If the receiver is already gone this send is a no-op.
                let _ = tx.send(Err(log_status(store_status(err)))).await;
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    async fn get_uploaded_images_table_string(
        &self,
        request: Request<GetUploadedImagesTableStringRequest>,
    ) -> Result<Response<GetUploadedImagesTableStringResponse>, Status> {
        let limit = request.into_inner().limit;

        tracing::info!(limit, "received an images-table request");

        let table = self.store.list(limit).await;
        Ok(Response::new(GetUploadedImagesTableStringResponse { table }))
    }
}

/// The name keys the index and, with the type suffix appended, becomes the
/// on-disk file name, so it must not escape the image folder.
fn validate_upload_header(name: &str, ext: &str) -> Result<(), Status> {
    if name.is_empty() {
        return Err(log_status(Status::invalid_argument(
            "image name must not be empty",
        )));
    }
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(log_status(Status::invalid_argument(format!(
            "image name must not contain path separators: {name}"
        ))));
    }
    if !ext.starts_with('.') || ext.contains(['/', '\\']) || ext.contains("..") {
        return Err(log_status(Status::invalid_argument(format!(
            "image type must be a plain extension beginning with '.': {ext}"
        ))));
    }
    Ok(())
}

/// Sink that wraps each emission in a response message and pushes it onto
/// the download stream.
struct ChannelSink {
    tx: mpsc::Sender<Result<DownloadImageResponse, Status>>,
}

#[async_trait::async_trait]
impl ImageSink for ChannelSink {
    async fn info(&mut self, meta: &ImageMeta) -> Result<(), StoreError> {
        let response = DownloadImageResponse {
            data: Some(download_image_response::Data::Info(proto::ImageInfo {
                name: meta.name.clone(),
                r#type: meta.ext.clone(),
                updated_at: Some(meta.updated_at.into()),
            })),
        };
        self.tx
            .send(Ok(response))
            .await
            .map_err(|_| StoreError::SinkClosed)
    }

    async fn chunk(&mut self, data: &[u8]) -> Result<(), StoreError> {
        tracing::debug!(size = data.len(), "sending a chunk");

        let response = DownloadImageResponse {
            data: Some(download_image_response::Data::ChunkData(data.to_vec())),
        };
        self.tx
            .send(Ok(response))
            .await
            .map_err(|_| StoreError::SinkClosed)
    }
}

/// Server configuration and runner.
pub struct ImageVaultServer {
    addr: SocketAddr,
    store: Arc<dyn ImageStore>,
}

impl ImageVaultServer {
    /// Server bound to the given address, backed by the given store.
    pub fn new(addr: SocketAddr, store: Arc<dyn ImageStore>) -> Self {
        Self { addr, store }
    }

    /// Runs the server until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), tonic::transport::Error> {
        let service = ImageVaultService::new(self.store);

        tracing::info!("starting gRPC server on {}", self.addr);

        tonic::transport::Server::builder()
            .layer(MethodConcurrencyLayer::default())
            .add_service(proto::image_service_server::ImageServiceServer::new(service))
            .serve_with_shutdown(self.addr, shutdown_signal())
            .await?;

        tracing::info!("gRPC server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for ImageVaultServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageVaultServer")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
