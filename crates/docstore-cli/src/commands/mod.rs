use anyhow::{anyhow, Result};

use docstore_data::DocumentStore;
use docstore_db::{Connect, DocumentStoreClient, StoreConfig};

use crate::cli::Command;

mod demo;
pub use demo::*;

mod documents;
pub use documents::*;

impl Command {
    /// Whether the command runs on a connection opened for it.
    /// The demo opens and closes its own.
    fn connects(&self) -> bool {
        !matches!(self, Command::Demo(_))
    }

    /// Run a single command, connecting and disconnecting around it
    pub async fn run<S>(self, config: StoreConfig) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let mut client = DocumentStoreClient::<S>::new(config);
        if self.connects() && !client.connect().await {
            return Err(anyhow!(
                "could not connect to {}",
                client.config().connection_string
            ));
        }

        let result = match self {
            Command::Demo(cmd) => cmd.run(&mut client).await,
            Command::Create(cmd) => cmd.run(&client).await,
            Command::CreateMany(cmd) => cmd.run(&client).await,
            Command::Get(cmd) => cmd.run(&client).await,
            Command::Find(cmd) => cmd.run(&client).await,
            Command::List(cmd) => cmd.run(&client).await,
            Command::Aggregate(cmd) => cmd.run(&client).await,
            Command::Update(cmd) => cmd.run(&client).await,
            Command::UpdateMany(cmd) => cmd.run(&client).await,
            Command::Delete(cmd) => cmd.run(&client).await,
            Command::DeleteMany(cmd) => cmd.run(&client).await,
            Command::Clear(cmd) => cmd.run(&client).await,
        };

        if client.is_connected() {
            client.disconnect().await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use docstore_db::{MemoryConnection, MongoConnection};

    use super::*;

    #[tokio::test]
    async fn test_run_demo_on_memory() {
        let command = Command::Demo(Demo {});
        assert!(command
            .run::<MemoryConnection>(StoreConfig::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_run_fails_without_connection() {
        let config = StoreConfig {
            connection_string: "definitely not a uri".to_string(),
            ..StoreConfig::default()
        };
        let command = Command::List(ListDocuments { limit: 10 });
        assert!(command.run::<MongoConnection>(config).await.is_err());
    }
}
