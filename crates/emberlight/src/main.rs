//! Binary entry point for the Emberlight engine.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lib_emberlight::init().await
}
