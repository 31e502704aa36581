fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use vendored protoc binary — no system installation required
    let protoc_path = protoc_bin_vendored::protoc_bin_path()
        .expect("protoc-bin-vendored: no binary for this platform");
    std::env::set_var("PROTOC", protoc_path);

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["proto/gophkeeper.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/gophkeeper.proto");
    Ok(())
}
