//! Image vault gRPC server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use imagevault::DiskImageStore;
use imagevault_grpc::ImageVaultServer;

/// Image vault - stream image uploads and downloads over gRPC
#[derive(Parser, Debug)]
#[command(name = "imagevault-grpc")]
#[command(about = "gRPC server storing images on the local filesystem")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Folder that holds the stored image files
    #[arg(long, default_value = "img")]
    image_folder: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    std::fs::create_dir_all(&args.image_folder)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let store = Arc::new(DiskImageStore::new(args.image_folder));

    let server = ImageVaultServer::new(addr, store);
    server.run().await?;

    Ok(())
}
