pub mod config;
pub use config::StoreConfig;

pub mod connection;
pub use connection::Connect;

pub mod client;
pub use client::DocumentStoreClient;

pub mod matching;
pub mod pipeline;

pub mod memory;
pub use memory::MemoryConnection;

pub mod mongo;
pub use mongo::MongoConnection;
