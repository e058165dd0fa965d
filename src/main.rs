use anyhow::Result;
use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

use nevod_lsp::server::NevodLanguageServer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Nevod Language Server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(NevodLanguageServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
