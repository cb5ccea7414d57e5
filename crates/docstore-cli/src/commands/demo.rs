use anyhow::Result;
use bson::{doc, Document};
use clap::Args;

use docstore_data::{documents, DocumentStore};
use docstore_db::{Connect, DocumentStoreClient};

use crate::formatting::{field, PrintFormatted};

fn section(title: &str) {
    println!();
    println!("{}", title);
    println!("{:-<60}", "-");
}

fn banner(title: &str) {
    println!();
    println!("{:=<60}", "=");
    println!("{}", title);
    println!("{:=<60}", "=");
}

/// Sample users for the walkthrough: Alice alone, the rest as a batch
pub fn sample_users() -> (Document, Vec<Document>) {
    let alice = doc! {
        "name": "Alice Johnson",
        "email": "alice@example.com",
        "age": 28,
        "city": "Seattle",
        "status": "active",
    };
    let others = vec![
        doc! {
            "name": "Bob Smith",
            "email": "bob@example.com",
            "age": 35,
            "city": "Portland",
            "status": "active",
        },
        doc! {
            "name": "Charlie Brown",
            "email": "charlie@example.com",
            "age": 42,
            "city": "Seattle",
            "status": "inactive",
        },
        doc! {
            "name": "Diana Prince",
            "email": "diana@example.com",
            "age": 31,
            "city": "New York",
            "status": "active",
        },
    ];
    (alice, others)
}

/// What a walkthrough left behind, for checking it ran to the end
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DemoSummary {
    pub connected: bool,
    pub created: usize,
    pub active_users: usize,
    pub seattle_users: usize,
    pub reactivated: u64,
    pub deleted_over_40: u64,
    pub remaining: usize,
}

#[derive(Args, Debug)]
pub struct Demo {}

impl Demo {
    /// Run the walkthrough, connecting and disconnecting on its own
    pub async fn run<S>(self, client: &mut DocumentStoreClient<S>) -> Result<()>
    where
        S: Connect + DocumentStore,
    {
        banner("DocumentDB CRUD Operations Demo");
        let summary = walkthrough(client).await;
        if summary.connected {
            banner("Demo completed successfully!");
        }
        Ok(())
    }
}

pub async fn walkthrough<S>(client: &mut DocumentStoreClient<S>) -> DemoSummary
where
    S: Connect + DocumentStore,
{
    let mut summary = DemoSummary::default();

    section("[1] CONNECTING");
    if !client.connect().await {
        println!("Failed to connect. Exiting.");
        return summary;
    }
    summary.connected = true;

    // Start from an empty collection
    client.delete_all().await;

    section("[2] CREATE OPERATIONS");
    let (alice, others) = sample_users();
    let alice_id = client.create_document(alice).await.map(|id| id.to_hex());
    let other_ids = client.create_documents(others).await;
    summary.created = usize::from(alice_id.is_some()) + other_ids.len();

    section("[3] READ OPERATIONS");
    if let Some(id) = &alice_id {
        if let Some(doc) = client.read_by_id(id).await {
            doc.print_formatted();
        }
    }

    println!();
    println!("Querying for active users:");
    let active = client.read_by_query(&doc! { "status": "active" }, 10).await;
    for user in &active {
        println!("  - {} ({})", field(user, "name"), field(user, "email"));
    }
    summary.active_users = active.len();

    println!();
    println!("Querying for users in Seattle:");
    let seattle = client.read_by_query(&doc! { "city": "Seattle" }, 10).await;
    for user in &seattle {
        println!("  - {} (Age: {})", field(user, "name"), field(user, "age"));
    }
    summary.seattle_users = seattle.len();

    println!();
    println!("Reading all documents:");
    let everyone = client.read_all(100).await;
    println!("Total users in collection: {}", everyone.len());

    section("[4] UPDATE OPERATIONS");
    if let Some(id) = &alice_id {
        println!();
        println!("Updating user {}:", id);
        let fields = doc! {
            "age": 29,
            "city": "San Francisco",
            "lastLogin": documents::now(),
        };
        client.update_by_id(id, fields).await;

        if let Some(updated) = client.read_by_id(id).await {
            println!("  Updated age: {}", field(&updated, "age"));
            println!("  Updated city: {}", field(&updated, "city"));
        }
    }

    println!();
    println!("Updating all inactive users to active:");
    summary.reactivated = client
        .update_by_query(
            &doc! { "status": "inactive" },
            doc! { "status": "active", "statusChangedAt": documents::now() },
        )
        .await;

    section("[5] DELETE OPERATIONS");
    println!();
    println!("Deleting users over age 40:");
    summary.deleted_over_40 = client
        .delete_by_query(&doc! { "age": { "$gt": 40 } })
        .await;

    let remaining = client.read_all(100).await;
    println!();
    println!("Remaining users: {}", remaining.len());
    for user in &remaining {
        println!("  - {} (Age: {})", field(user, "name"), field(user, "age"));
    }

    if let Some(id) = &alice_id {
        println!();
        println!("Deleting user {}:", id);
        client.delete_by_id(id).await;
    }
    summary.remaining = client.read_all(100).await.len();

    section("[6] CLEANUP");
    println!("Deleting all remaining documents:");
    client.delete_all().await;

    section("[7] DISCONNECTING");
    client.disconnect().await;

    summary
}

#[cfg(test)]
mod tests {
    use docstore_db::{MemoryConnection, MongoConnection, StoreConfig};

    use super::*;

    #[tokio::test]
    async fn test_walkthrough_in_memory() {
        let mut client = DocumentStoreClient::<MemoryConnection>::new(StoreConfig::default());
        let summary = walkthrough(&mut client).await;
        assert_eq!(
            summary,
            DemoSummary {
                connected: true,
                created: 4,
                active_users: 3,
                seattle_users: 2,
                reactivated: 1,
                deleted_over_40: 1,
                remaining: 2,
            }
        );
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_walkthrough_stops_without_connection() {
        let config = StoreConfig {
            connection_string: "definitely not a uri".to_string(),
            ..StoreConfig::default()
        };
        let mut client = DocumentStoreClient::<MongoConnection>::new(config);
        let summary = walkthrough(&mut client).await;
        assert_eq!(summary, DemoSummary::default());
    }
}
