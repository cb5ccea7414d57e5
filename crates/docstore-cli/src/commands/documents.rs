use anyhow::Result;
use clap::Args;
use inquire::Confirm;

use docstore_data::{documents, DocumentStore};
use docstore_db::{Connect, DocumentStoreClient};

use crate::formatting::PrintFormatted;

/// Ask before destroying data unless `--yes` was given
fn confirmed(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    let confirm = Confirm::new(prompt).with_default(false);
    Ok(confirm.prompt()?)
}

#[derive(Args, Debug)]
pub struct CreateDocument {
    /// Document as (extended) JSON
    #[clap(short, long)]
    pub json: String,
}

impl CreateDocument {
    /// Run the command and insert a document
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let doc = documents::from_json(&self.json)?;
        if let Some(id) = client.create_document(doc).await {
            println!("{}", id);
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct CreateDocuments {
    /// JSON array of documents
    #[clap(short, long)]
    pub json: String,
}

impl CreateDocuments {
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let docs = documents::from_json_array(&self.json)?;
        for id in client.create_documents(docs).await {
            println!("{}", id);
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct GetDocument {
    #[clap(short, long)]
    pub id: String,
}

impl GetDocument {
    /// Run the command and show a document
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        if let Some(doc) = client.read_by_id(&self.id).await {
            println!();
            doc.print_formatted();
            println!();
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct FindDocuments {
    /// Query filter as (extended) JSON, e.g. '{"age": {"$gt": 40}}'
    #[clap(short, long)]
    pub filter: String,
    #[clap(short, long, default_value_t = 10)]
    pub limit: u32,
}

impl FindDocuments {
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let filter = documents::from_json(&self.filter)?;
        let found = client.read_by_query(&filter, self.limit).await;
        println!("{} documents.", found.len());
        found.print_formatted();
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ListDocuments {
    #[clap(short, long, default_value_t = 100)]
    pub limit: u32,
}

impl ListDocuments {
    /// Run the command and list documents
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let found = client.read_all(self.limit).await;
        println!("{} documents.", found.len());
        found.print_formatted();
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct AggregateDocuments {
    /// Pipeline as a JSON array of stages,
    /// e.g. '[{"$group": {"_id": "$category", "avgPrice": {"$avg": "$price"}}}]'
    #[clap(short, long)]
    pub pipeline: String,
}

impl AggregateDocuments {
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let pipeline = documents::from_json_array(&self.pipeline)?;
        let found = client.aggregate(&pipeline).await;
        println!("{} documents.", found.len());
        found.print_formatted();
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct UpdateDocument {
    #[clap(short, long)]
    pub id: String,
    /// Fields to set as (extended) JSON
    #[clap(short, long)]
    pub set: String,
}

impl UpdateDocument {
    /// Run command and update a document, showing what changed
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let fields = documents::from_json(&self.set)?;
        let Some(before) = client.read_by_id(&self.id).await else {
            return Ok(());
        };
        if !client.update_by_id(&self.id, fields).await {
            return Ok(());
        }
        if let Some(after) = client.read_by_id(&self.id).await {
            println!();
            (before, after).print_formatted();
            println!();
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct UpdateDocuments {
    #[clap(short, long)]
    pub filter: String,
    #[clap(short, long)]
    pub set: String,
}

impl UpdateDocuments {
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let filter = documents::from_json(&self.filter)?;
        let fields = documents::from_json(&self.set)?;
        let modified = client.update_by_query(&filter, fields).await;
        println!("{} documents updated.", modified);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct DeleteDocument {
    #[clap(short, long)]
    pub id: String,
    /// Do not ask for confirmation
    #[clap(short, long)]
    pub yes: bool,
}

impl DeleteDocument {
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let Some(doc) = client.read_by_id(&self.id).await else {
            return Ok(());
        };
        println!();
        doc.print_formatted();
        println!();
        if !confirmed("Delete document?", self.yes)? {
            return Ok(());
        }
        client.delete_by_id(&self.id).await;
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct DeleteDocuments {
    #[clap(short, long)]
    pub filter: String,
    /// Do not ask for confirmation
    #[clap(short, long)]
    pub yes: bool,
}

impl DeleteDocuments {
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let filter = documents::from_json(&self.filter)?;
        if !confirmed("Delete all matching documents?", self.yes)? {
            return Ok(());
        }
        let deleted = client.delete_by_query(&filter).await;
        println!("{} documents deleted.", deleted);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ClearDocuments {
    /// Do not ask for confirmation
    #[clap(short, long)]
    pub yes: bool,
}

impl ClearDocuments {
    pub async fn run<S>(self, client: &DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        let prompt = format!("Delete every document in {}?", client.config().namespace());
        if !confirmed(&prompt, self.yes)? {
            return Ok(());
        }
        let deleted = client.delete_all().await;
        println!("{} documents deleted.", deleted);
        Ok(())
    }
}
