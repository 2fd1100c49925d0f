mod markdown;
mod multiquery;
mod openai;
mod tools;

pub const USER_AGENT: &str = concat!("refract/", env!("CARGO_PKG_VERSION"), " (MCP Server)");

use rmcp::{ServiceExt, transport::stdio};
use tools::Refract;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("refract=info".parse()?),
        )
        .init();

    info!("starting refract MCP server");

    let service = Refract::new()?
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("failed to start server: {e}"))?;

    service.waiting().await?;
    info!("server stopped");
    Ok(())
}
