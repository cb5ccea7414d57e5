use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use tokio::sync::Mutex;
use tracing::debug;

use docstore_data::{
    documents, Aggregate, Delete, Insert, Query, Retrieve, StoreError, Update, UpdateOutcome,
    ID_FIELD,
};

use crate::{matching, pipeline, Connect, DocumentStoreClient, StoreConfig};

/// An in-process collection with the observable behaviour of a
/// MongoDB collection: insertion order, server assigned object ids,
/// a unique `_id` and `$set` updates.
///
/// Documents live as long as the connection; nothing is persisted.
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    namespace: String,
    documents: Arc<Mutex<Vec<Document>>>,
}

impl MemoryConnection {
    pub fn new(database: &str, collection: &str) -> Self {
        MemoryConnection {
            namespace: format!("{}.{}", database, collection),
            documents: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn duplicate_key(&self, id: &ObjectId) -> anyhow::Error {
        StoreError::DuplicateKey(format!(
            "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: ObjectId('{}') }}",
            self.namespace, id
        ))
        .into()
    }

    async fn update(
        &self,
        filter: &Document,
        fields: &Document,
        many: bool,
    ) -> Result<UpdateOutcome> {
        matching::validate(filter)?;
        let mut documents = self.documents.lock().await;
        let mut outcome = UpdateOutcome::default();
        for doc in documents.iter_mut() {
            if !matching::matches(doc, filter)? {
                continue;
            }
            outcome.matched += 1;
            if matching::apply_set(doc, fields)? {
                outcome.modified += 1;
            }
            if !many {
                break;
            }
        }
        Ok(outcome)
    }

    async fn delete(&self, filter: &Document, many: bool) -> Result<u64> {
        matching::validate(filter)?;
        let mut documents = self.documents.lock().await;
        let mut deleted = 0;
        let mut index = 0;
        while index < documents.len() {
            if (many || deleted == 0) && matching::matches(&documents[index], filter)? {
                documents.remove(index);
                deleted += 1;
            } else {
                index += 1;
            }
        }
        Ok(deleted)
    }
}

/// Give a document its identifier, placing `_id` first as the driver does.
fn with_id(doc: Document) -> Result<(ObjectId, Document)> {
    if let Some(id) = documents::document_id(&doc)? {
        return Ok((id, doc));
    }
    let id = ObjectId::new();
    let mut stored = Document::new();
    stored.insert(ID_FIELD, id);
    for (key, value) in doc {
        stored.insert(key, value);
    }
    Ok((id, stored))
}

fn has_id(documents: &[Document], id: &ObjectId) -> bool {
    documents
        .iter()
        .any(|doc| matches!(doc.get(ID_FIELD), Some(Bson::ObjectId(existing)) if existing == id))
}

#[async_trait]
impl Connect for MemoryConnection {
    async fn connect(config: &StoreConfig) -> Result<Self> {
        debug!(namespace = %config.namespace(), "opening in-memory collection");
        Ok(MemoryConnection::new(
            &config.database_name,
            &config.collection_name,
        ))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.documents.lock().await.clear();
        Ok(())
    }
}

#[async_trait]
impl Insert<Document> for MemoryConnection {
    async fn insert(&self, item: Document) -> Result<ObjectId> {
        let (id, stored) = with_id(item)?;
        let mut documents = self.documents.lock().await;
        if has_id(&documents, &id) {
            return Err(self.duplicate_key(&id));
        }
        documents.push(stored);
        Ok(id)
    }

    /// Ordered insert: documents before a failing one stay inserted.
    async fn insert_many(&self, items: Vec<Document>) -> Result<Vec<ObjectId>> {
        if items.is_empty() {
            return Err(StoreError::Operation("documents must not be empty".to_string()).into());
        }
        let mut documents = self.documents.lock().await;
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let (id, stored) = with_id(item)?;
            if has_id(&documents, &id) {
                return Err(self.duplicate_key(&id));
            }
            documents.push(stored);
            ids.push(id);
        }
        Ok(ids)
    }
}

#[async_trait]
impl Query<Document> for MemoryConnection {
    type Filter = Document;

    async fn query(&self, filter: &Self::Filter, limit: u32) -> Result<Vec<Document>> {
        matching::validate(filter)?;
        let documents = self.documents.lock().await;
        let mut found = Vec::new();
        for doc in documents.iter() {
            if limit > 0 && found.len() >= limit as usize {
                break;
            }
            if matching::matches(doc, filter)? {
                found.push(doc.clone());
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl Retrieve<Document> for MemoryConnection {
    type Key = ObjectId;

    async fn retrieve(&self, key: &Self::Key) -> Result<Option<Document>> {
        let documents = self.documents.lock().await;
        let doc = documents
            .iter()
            .find(|doc| matches!(doc.get(ID_FIELD), Some(Bson::ObjectId(id)) if id == key))
            .cloned();
        Ok(doc)
    }
}

#[async_trait]
impl Aggregate<Document> for MemoryConnection {
    async fn aggregate(&self, stages: &[Document]) -> Result<Vec<Document>> {
        let documents = self.documents.lock().await.clone();
        pipeline::run(documents, stages)
    }
}

#[async_trait]
impl Update<Document> for MemoryConnection {
    type Filter = Document;

    async fn update_one(&self, filter: &Self::Filter, fields: Document) -> Result<UpdateOutcome> {
        self.update(filter, &fields, false).await
    }

    async fn update_many(&self, filter: &Self::Filter, fields: Document) -> Result<UpdateOutcome> {
        self.update(filter, &fields, true).await
    }
}

#[async_trait]
impl Delete for MemoryConnection {
    type Filter = Document;

    async fn delete_one(&self, filter: &Self::Filter) -> Result<u64> {
        self.delete(filter, false).await
    }

    async fn delete_many(&self, filter: &Self::Filter) -> Result<u64> {
        self.delete(filter, true).await
    }
}

impl DocumentStoreClient<MemoryConnection> {
    /// Open a connected client on a fresh in-memory collection.
    pub async fn open_test() -> Self {
        let mut client = DocumentStoreClient::new(StoreConfig::default());
        client.connect().await;
        client
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn store() -> MemoryConnection {
        MemoryConnection::new("testdb", "users")
    }

    #[tokio::test]
    async fn test_insert_assigns_id_first() {
        let db = store();
        let id = db.insert(doc! { "name": "Alice" }).await.unwrap();
        let doc = db.retrieve(&id).await.unwrap().unwrap();
        assert_eq!(doc.keys().next().map(String::as_str), Some(ID_FIELD));
        assert_eq!(doc.get_object_id(ID_FIELD).unwrap(), id);
        assert_eq!(doc.get_str("name").unwrap(), "Alice");
    }

    #[tokio::test]
    async fn test_insert_duplicate_id() {
        let db = store();
        let id = ObjectId::new();
        db.insert(doc! { "_id": id, "name": "Alice" }).await.unwrap();
        let err = db.insert(doc! { "_id": id, "name": "Mallory" }).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::DuplicateKey(_))
        ));
        assert_eq!(db.query(&doc! {}, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_object_id() {
        let db = store();
        let err = db.insert(doc! { "_id": "alice" }).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_many_is_ordered() {
        let db = store();
        let taken = ObjectId::new();
        db.insert(doc! { "_id": taken }).await.unwrap();

        let batch = vec![
            doc! { "name": "Bob" },
            doc! { "_id": taken, "name": "Charlie" },
            doc! { "name": "Diana" },
        ];
        assert!(db.insert_many(batch).await.is_err());

        // Bob made it in before the conflict, Diana did not
        let names: Vec<String> = db
            .query(&doc! { "name": { "$exists": true } }, 0)
            .await
            .unwrap()
            .iter()
            .map(|d| d.get_str("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Bob"]);

        assert!(db.insert_many(Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_query_limit_and_order() {
        let db = store();
        let ids = db
            .insert_many((0..5).map(|n| doc! { "n": n }).collect())
            .await
            .unwrap();
        assert_eq!(ids.len(), 5);

        let all = db.query(&doc! {}, 0).await.unwrap();
        assert_eq!(all.len(), 5);
        let first_two = db.query(&doc! {}, 2).await.unwrap();
        assert_eq!(first_two.len(), 2);
        assert_eq!(first_two[0].get_object_id(ID_FIELD).unwrap(), ids[0]);
        assert_eq!(first_two[1].get_object_id(ID_FIELD).unwrap(), ids[1]);

        let big = db.query(&doc! { "n": { "$gte": 3 } }, 10).await.unwrap();
        assert_eq!(big.len(), 2);
    }

    #[tokio::test]
    async fn test_query_rejects_bad_filter() {
        let db = store();
        assert!(db.query(&doc! { "n": { "$near": 1 } }, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_update_counts() {
        let db = store();
        db.insert_many(vec![
            doc! { "status": "inactive" },
            doc! { "status": "inactive" },
            doc! { "status": "active" },
        ])
        .await
        .unwrap();

        let outcome = db
            .update_one(&doc! { "status": "inactive" }, doc! { "status": "active" })
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });

        let outcome = db
            .update_many(&doc! {}, doc! { "status": "active" })
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 3, modified: 1 });

        let outcome = db
            .update_many(&doc! { "status": "gone" }, doc! { "status": "active" })
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
    }

    #[tokio::test]
    async fn test_delete_one_and_many() {
        let db = store();
        db.insert_many(vec![
            doc! { "age": 35 },
            doc! { "age": 42 },
            doc! { "age": 51 },
        ])
        .await
        .unwrap();

        assert_eq!(db.delete_one(&doc! { "age": { "$gt": 40 } }).await.unwrap(), 1);
        assert_eq!(db.delete_many(&doc! { "age": { "$gt": 40 } }).await.unwrap(), 1);
        assert_eq!(db.delete_many(&doc! { "age": { "$gt": 40 } }).await.unwrap(), 0);
        assert_eq!(db.delete_many(&doc! {}).await.unwrap(), 1);
        assert!(db.query(&doc! {}, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_drops_documents() {
        let db = store();
        let view = db.clone();
        db.insert(doc! { "name": "Alice" }).await.unwrap();
        db.close().await.unwrap();
        assert!(view.query(&doc! {}, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_reads_a_snapshot() {
        let db = store();
        db.insert_many(vec![
            doc! { "category": "electronics", "price": 1299.99 },
            doc! { "category": "office", "price": 4.99 },
        ])
        .await
        .unwrap();

        let stages = vec![doc! { "$group": { "_id": "$category", "n": { "$sum": 1 } } }];
        let groups = db.aggregate(&stages).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(db.query(&doc! {}, 0).await.unwrap().len(), 2);

        let err = db.aggregate(&[doc! { "$out": "copy" }]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Operation(_))
        ));
    }
}
