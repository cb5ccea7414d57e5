use anyhow::Result;
use async_trait::async_trait;
use bson::{oid::ObjectId, Document};

use crate::UpdateOutcome;

#[async_trait]
pub trait Insert<T> {
    /// Insert one item and return its assigned identifier
    async fn insert(&self, item: T) -> Result<ObjectId>;

    /// Insert a batch; identifiers are returned in input order
    async fn insert_many(&self, items: Vec<T>) -> Result<Vec<ObjectId>>;
}

#[async_trait]
pub trait Query<T> {
    type Filter;

    /// Fetch up to `limit` matches in store order. A limit of 0 is unbounded.
    async fn query(&self, filter: &Self::Filter, limit: u32) -> Result<Vec<T>>;
}

#[async_trait]
pub trait Retrieve<T> {
    type Key;
    async fn retrieve(&self, key: &Self::Key) -> Result<Option<T>>;
}

#[async_trait]
pub trait Aggregate<T> {
    /// Run a pipeline of stages over the whole collection
    async fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<T>>;
}

#[async_trait]
pub trait Update<T> {
    type Filter;

    /// Merge `fields` into the first match
    async fn update_one(&self, filter: &Self::Filter, fields: T) -> Result<UpdateOutcome>;

    /// Merge `fields` into every match
    async fn update_many(&self, filter: &Self::Filter, fields: T) -> Result<UpdateOutcome>;
}

#[async_trait]
pub trait Delete {
    type Filter;
    async fn delete_one(&self, filter: &Self::Filter) -> Result<u64>;
    async fn delete_many(&self, filter: &Self::Filter) -> Result<u64>;
}

/// Everything a collection of schema-free documents must support.
pub trait DocumentStore:
    Insert<Document>
    + Query<Document, Filter = Document>
    + Retrieve<Document, Key = ObjectId>
    + Aggregate<Document>
    + Update<Document, Filter = Document>
    + Delete<Filter = Document>
    + Send
    + Sync
{
}

impl<S> DocumentStore for S where
    S: Insert<Document>
        + Query<Document, Filter = Document>
        + Retrieve<Document, Key = ObjectId>
        + Aggregate<Document>
        + Update<Document, Filter = Document>
        + Delete<Filter = Document>
        + Send
        + Sync
{
}
