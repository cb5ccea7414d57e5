use clap::{Parser, Subcommand, ValueEnum};

use docstore_db::StoreConfig;

use crate::commands::{
    AggregateDocuments, ClearDocuments, CreateDocument, CreateDocuments, DeleteDocument, DeleteDocuments, Demo,
    FindDocuments, GetDocument, ListDocuments, UpdateDocument, UpdateDocuments,
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// A MongoDB compatible server
    Mongo,
    /// A throwaway collection inside this process
    Memory,
}

#[derive(Parser, Debug)]
#[clap(name = "docstore", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Overrides DOCUMENTDB_CONNECTION_STRING
    #[clap(long)]
    pub connection_string: Option<String>,
    /// Overrides DOCUMENTDB_DATABASE_NAME
    #[clap(long)]
    pub database: Option<String>,
    /// Overrides DOCUMENTDB_COLLECTION_NAME
    #[clap(long)]
    pub collection: Option<String>,
    /// Overrides DOCUMENTDB_TIMEOUT_MS
    #[clap(long)]
    pub timeout_ms: Option<u64>,

    #[clap(long, value_enum, env = "DOCUMENTDB_BACKEND", default_value_t = Backend::Mongo)]
    pub backend: Backend,

    #[clap(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn init() -> Self {
        Self::parse()
    }

    /// Environment (and `.env`) configuration with flags applied on top
    pub fn config(&self) -> StoreConfig {
        self.apply(StoreConfig::from_env())
    }

    fn apply(&self, mut config: StoreConfig) -> StoreConfig {
        if let Some(connection_string) = &self.connection_string {
            config.connection_string = connection_string.clone();
        }
        if let Some(database) = &self.database {
            config.database_name = database.clone();
        }
        if let Some(collection) = &self.collection {
            config.collection_name = collection.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk through every CRUD operation on sample users
    #[clap(name = "demo")]
    Demo(Demo),

    /// Insert one document
    #[clap(name = "create")]
    Create(CreateDocument),
    /// Insert a batch of documents
    #[clap(name = "create-many")]
    CreateMany(CreateDocuments),

    /// Show a document by id
    #[clap(name = "get")]
    Get(GetDocument),
    /// List documents matching a filter
    #[clap(name = "find")]
    Find(FindDocuments),
    /// List documents
    #[clap(name = "list")]
    List(ListDocuments),
    /// Run an aggregation pipeline
    #[clap(name = "aggregate")]
    Aggregate(AggregateDocuments),

    /// Set fields on a document
    #[clap(name = "update")]
    Update(UpdateDocument),
    /// Set fields on every document matching a filter
    #[clap(name = "update-many")]
    UpdateMany(UpdateDocuments),

    /// Delete a document by id
    #[clap(name = "delete")]
    Delete(DeleteDocument),
    /// Delete every document matching a filter
    #[clap(name = "delete-many")]
    DeleteMany(DeleteDocuments),
    /// Delete every document in the collection
    #[clap(name = "clear")]
    Clear(ClearDocuments),
}
