use anyhow::Result;
use bson::{oid::ObjectId, Document};
use tracing::{error, info, warn};

use docstore_data::{
    documents, Aggregate, Delete, DocumentStore, Insert, Query, Retrieve, StoreError, Update,
};

use crate::{Connect, StoreConfig};

/// CRUD on one collection with a forgiving failure policy.
///
/// Store errors never reach the caller. They are logged where they occur
/// and turned into an empty result, so "nothing matched" and "the
/// operation failed" look the same from the outside.
pub struct DocumentStoreClient<S> {
    config: StoreConfig,
    store: Option<S>,
}

/// Log a failed operation with wording that depends on its kind
fn report(action: &str, err: &anyhow::Error) {
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::DuplicateKey(_)) => {
            error!("Document with ID already exists: {err}")
        }
        Some(kind) if kind.is_connectivity() => {
            error!("Connection error while {action}: {err}")
        }
        _ => error!("Error {action}: {err}"),
    }
}

impl<S> DocumentStoreClient<S>
where
    S: Connect + DocumentStore,
{
    pub fn new(config: StoreConfig) -> Self {
        DocumentStoreClient {
            config,
            store: None,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&S> {
        Ok(self.store.as_ref().ok_or(StoreError::NotConnected)?)
    }

    async fn open(config: &StoreConfig) -> Result<S> {
        let store = S::connect(config).await?;
        if let Err(err) = store.ping().await {
            if let Err(close_err) = store.close().await {
                warn!("Closing after failed ping: {close_err}");
            }
            return Err(err);
        }
        Ok(store)
    }

    /// Connect, ping and select the collection.
    /// Failures are reported and yield `false`.
    pub async fn connect(&mut self) -> bool {
        match Self::open(&self.config).await {
            Ok(store) => {
                info!(
                    "Successfully connected to {} ({})",
                    self.config.connection_string,
                    self.config.namespace()
                );
                self.store = Some(store);
                true
            }
            Err(err) => {
                error!("Failed to connect to {}: {err}", self.config.connection_string);
                false
            }
        }
    }

    pub async fn disconnect(&mut self) {
        let Some(store) = self.store.take() else {
            warn!("Disconnect requested but no connection is open");
            return;
        };
        match store.close().await {
            Ok(()) => info!("Disconnected from {}", self.config.connection_string),
            Err(err) => report("disconnecting", &err),
        }
    }

    // ==================== Create ====================

    /// Stamp `createdAt` and insert one document
    pub async fn create_document(&self, mut doc: Document) -> Option<ObjectId> {
        let result = async {
            documents::document_id(&doc)?;
            documents::stamp_created(&mut doc, documents::now());
            self.store()?.insert(doc).await
        }
        .await;
        match result {
            Ok(id) => {
                info!("Document created with ID: {id}");
                Some(id)
            }
            Err(err) => {
                report("creating document", &err);
                None
            }
        }
    }

    /// Stamp and insert a batch. Any failure yields no identifiers.
    pub async fn create_documents(&self, mut docs: Vec<Document>) -> Vec<ObjectId> {
        let result = async {
            let at = documents::now();
            for doc in docs.iter_mut() {
                documents::document_id(doc)?;
                documents::stamp_created(doc, at);
            }
            self.store()?.insert_many(docs).await
        }
        .await;
        match result {
            Ok(ids) => {
                info!("Created {} documents", ids.len());
                ids
            }
            Err(err) => {
                report("creating documents", &err);
                Vec::new()
            }
        }
    }

    // ==================== Read ====================

    /// Fetch one document by the hex form of its id.
    /// A malformed id is reported as an error, not as missing.
    pub async fn read_by_id(&self, id: &str) -> Option<Document> {
        let result = async {
            let key = documents::parse_id(id)?;
            self.store()?.retrieve(&key).await
        }
        .await;
        match result {
            Ok(Some(doc)) => {
                info!("Document found: {id}");
                Some(doc)
            }
            Ok(None) => {
                warn!("Document not found: {id}");
                None
            }
            Err(err) => {
                report("reading document", &err);
                None
            }
        }
    }

    /// Up to `limit` matches in store order; 0 means no limit
    pub async fn read_by_query(&self, filter: &Document, limit: u32) -> Vec<Document> {
        let result = async { self.store()?.query(filter, limit).await }.await;
        match result {
            Ok(found) => {
                info!("Found {} documents matching query", found.len());
                found
            }
            Err(err) => {
                report("querying documents", &err);
                Vec::new()
            }
        }
    }

    pub async fn read_all(&self, limit: u32) -> Vec<Document> {
        self.read_by_query(&Document::new(), limit).await
    }

    /// Run an aggregation pipeline over the collection
    pub async fn aggregate(&self, pipeline: &[Document]) -> Vec<Document> {
        let result = async { self.store()?.aggregate(pipeline).await }.await;
        match result {
            Ok(found) => {
                info!("Aggregation returned {} documents", found.len());
                found
            }
            Err(err) => {
                report("aggregating documents", &err);
                Vec::new()
            }
        }
    }

    // ==================== Update ====================

    /// Merge `fields` into one document and stamp `updatedAt`.
    ///
    /// Only an actual modification yields `true`; a document that matched
    /// but already held these values reports `false` like a missing one.
    pub async fn update_by_id(&self, id: &str, mut fields: Document) -> bool {
        let result = async {
            let key = documents::parse_id(id)?;
            documents::stamp_updated(&mut fields, documents::now());
            self.store()?
                .update_one(&documents::id_filter(key), fields)
                .await
        }
        .await;
        match result {
            Ok(outcome) if outcome.modified > 0 => {
                info!("Document updated: {id}");
                true
            }
            Ok(outcome) if outcome.matched > 0 => {
                warn!("Document matched but nothing changed: {id}");
                false
            }
            Ok(_) => {
                warn!("No document updated (may not exist): {id}");
                false
            }
            Err(err) => {
                report("updating document", &err);
                false
            }
        }
    }

    /// Merge `fields` into every match, all sharing one `updatedAt`.
    /// Returns the number of documents modified.
    pub async fn update_by_query(&self, filter: &Document, mut fields: Document) -> u64 {
        let result = async {
            documents::stamp_updated(&mut fields, documents::now());
            self.store()?.update_many(filter, fields).await
        }
        .await;
        match result {
            Ok(outcome) => {
                info!(
                    "Updated {} documents ({} matched)",
                    outcome.modified, outcome.matched
                );
                outcome.modified
            }
            Err(err) => {
                report("updating documents", &err);
                0
            }
        }
    }

    // ==================== Delete ====================

    pub async fn delete_by_id(&self, id: &str) -> bool {
        let result = async {
            let key = documents::parse_id(id)?;
            self.store()?.delete_one(&documents::id_filter(key)).await
        }
        .await;
        match result {
            Ok(deleted) if deleted > 0 => {
                info!("Document deleted: {id}");
                true
            }
            Ok(_) => {
                warn!("Document not found for deletion: {id}");
                false
            }
            Err(err) => {
                report("deleting document", &err);
                false
            }
        }
    }

    pub async fn delete_by_query(&self, filter: &Document) -> u64 {
        let result = async { self.store()?.delete_many(filter).await }.await;
        match result {
            Ok(deleted) => {
                info!("Deleted {deleted} documents");
                deleted
            }
            Err(err) => {
                report("deleting documents", &err);
                0
            }
        }
    }

    pub async fn delete_all(&self) -> u64 {
        self.delete_by_query(&Document::new()).await
    }
}
