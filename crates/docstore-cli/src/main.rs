use anyhow::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use docstore_cli::cli::{Backend, Cli};
use docstore_db::{MemoryConnection, MongoConnection};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::init();
    let config = cli.config();
    debug!("using: {:?} ({:?})", config, cli.backend);
    match cli.backend {
        Backend::Mongo => cli.command.run::<MongoConnection>(config).await,
        Backend::Memory => cli.command.run::<MemoryConnection>(config).await,
    }?;

    Ok(())
}
