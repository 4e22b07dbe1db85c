fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    tonic_build::configure()
        .build_server(true)
        .build_client(true) // exercised by the integration tests
        .compile_protos(&["proto/imagevault.proto"], &["proto/"])?;
    Ok(())
}
