use anyhow::Result;
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use futures::TryStreamExt;
use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::ClientOptions,
    Client, Collection,
};
use tracing::debug;

use docstore_data::{
    documents, Aggregate, Delete, Insert, Query, Retrieve, StoreError, Update, UpdateOutcome,
};

use crate::{Connect, StoreConfig};

const DUPLICATE_KEY: i32 = 11000;
const APP_NAME: &str = "docstore";

/// A collection on a MongoDB compatible server
#[derive(Debug, Clone)]
pub struct MongoConnection {
    client: Client,
    collection: Collection<Document>,
}

/// Sort a driver error into the kinds the client reports on
pub fn classify(err: MongoError) -> StoreError {
    let message = err.to_string();
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
            StoreError::DuplicateKey(message)
        }
        ErrorKind::InsertMany(insert)
            if insert
                .write_errors
                .iter()
                .flatten()
                .any(|write| write.code == DUPLICATE_KEY) =>
        {
            StoreError::DuplicateKey(message)
        }
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => StoreError::Connection(message),
        _ => StoreError::Operation(message),
    }
}

fn object_id(id: Bson) -> Result<ObjectId> {
    match id {
        Bson::ObjectId(id) => Ok(id),
        other => Err(StoreError::InvalidId(other.to_string()).into()),
    }
}

#[async_trait]
impl Connect for MongoConnection {
    async fn connect(config: &StoreConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.connection_string)
            .await
            .map_err(|err| StoreError::Connection(err.to_string()))?;
        options.server_selection_timeout = Some(config.timeout());
        options.connect_timeout = Some(config.timeout());
        options.app_name = Some(APP_NAME.to_string());

        let client =
            Client::with_options(options).map_err(|err| StoreError::Connection(err.to_string()))?;
        let collection = client
            .database(&config.database_name)
            .collection::<Document>(&config.collection_name);
        debug!(namespace = %config.namespace(), "selected collection");

        Ok(MongoConnection { client, collection })
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.client.shutdown().await;
        Ok(())
    }
}

#[async_trait]
impl Insert<Document> for MongoConnection {
    async fn insert(&self, item: Document) -> Result<ObjectId> {
        let result = self.collection.insert_one(item).await.map_err(classify)?;
        object_id(result.inserted_id)
    }

    async fn insert_many(&self, items: Vec<Document>) -> Result<Vec<ObjectId>> {
        let result = self.collection.insert_many(items).await.map_err(classify)?;
        let mut inserted: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        inserted.sort_by_key(|(index, _)| *index);
        inserted.into_iter().map(|(_, id)| object_id(id)).collect()
    }
}

#[async_trait]
impl Query<Document> for MongoConnection {
    type Filter = Document;

    async fn query(&self, filter: &Self::Filter, limit: u32) -> Result<Vec<Document>> {
        let mut find = self.collection.find(filter.clone());
        if limit > 0 {
            find = find.limit(i64::from(limit));
        }
        let cursor = find.await.map_err(classify)?;
        let found: Vec<Document> = cursor.try_collect().await.map_err(classify)?;
        Ok(found)
    }
}

#[async_trait]
impl Retrieve<Document> for MongoConnection {
    type Key = ObjectId;

    async fn retrieve(&self, key: &Self::Key) -> Result<Option<Document>> {
        let doc = self
            .collection
            .find_one(documents::id_filter(*key))
            .await
            .map_err(classify)?;
        Ok(doc)
    }
}

#[async_trait]
impl Aggregate<Document> for MongoConnection {
    async fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<Document>> {
        let cursor = self
            .collection
            .aggregate(pipeline.to_vec())
            .await
            .map_err(classify)?;
        let found: Vec<Document> = cursor.try_collect().await.map_err(classify)?;
        Ok(found)
    }
}

#[async_trait]
impl Update<Document> for MongoConnection {
    type Filter = Document;

    async fn update_one(&self, filter: &Self::Filter, fields: Document) -> Result<UpdateOutcome> {
        let result = self
            .collection
            .update_one(filter.clone(), doc! { "$set": fields })
            .await
            .map_err(classify)?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn update_many(&self, filter: &Self::Filter, fields: Document) -> Result<UpdateOutcome> {
        let result = self
            .collection
            .update_many(filter.clone(), doc! { "$set": fields })
            .await
            .map_err(classify)?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }
}

#[async_trait]
impl Delete for MongoConnection {
    type Filter = Document;

    async fn delete_one(&self, filter: &Self::Filter) -> Result<u64> {
        let result = self
            .collection
            .delete_one(filter.clone())
            .await
            .map_err(classify)?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, filter: &Self::Filter) -> Result<u64> {
        let result = self
            .collection
            .delete_many(filter.clone())
            .await
            .map_err(classify)?;
        Ok(result.deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_bad_connection_string() {
        let config = StoreConfig {
            connection_string: "not-a-connection-string".to_string(),
            ..StoreConfig::default()
        };
        let err = MongoConnection::connect(&config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Connection(_))
        ));
    }

    #[test]
    fn test_object_id() {
        let id = ObjectId::new();
        assert_eq!(object_id(Bson::ObjectId(id)).unwrap(), id);
        assert!(object_id(Bson::String("alice".into())).is_err());
    }
}
