//! Binary entrypoint for the nudge tool

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    nudge::cli::run().await
}
