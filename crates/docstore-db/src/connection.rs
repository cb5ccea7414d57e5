use anyhow::Result;
use async_trait::async_trait;

use crate::StoreConfig;

/// Lifecycle of a connection to a document store.
#[async_trait]
pub trait Connect: Sized + Send + Sync {
    /// Open a connection and select the configured database
    /// and collection, creating them implicitly if absent.
    async fn connect(config: &StoreConfig) -> Result<Self>;

    /// Round trip to the server proving the connection is live
    async fn ping(&self) -> Result<()>;

    /// Release the connection. It must not be used afterwards.
    async fn close(self) -> Result<()>;
}
