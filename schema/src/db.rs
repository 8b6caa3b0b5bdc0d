use mongodb::{
    Client, Collection, Database,
    bson::{Document, doc},
    options::ClientOptions,
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::instrument;

pub fn database(client: &Client, name: &str) -> Database {
    client.database(name)
}

pub fn get_collection<T>(db: &Database, collection_name: &str) -> Collection<T>
where
    T: Send + Sync + DeserializeOwned + Serialize,
{
    db.collection::<T>(collection_name)
}

/// Untyped handle, used where the raw document is returned to callers
pub fn get_raw_collection(db: &Database, collection_name: &str) -> Collection<Document> {
    db.collection::<Document>(collection_name)
}

pub async fn client(uri: &str) -> mongodb::error::Result<Client> {
    let mut client_options = ClientOptions::parse(uri).await?;

    client_options.app_name = Some(env!("CARGO_CRATE_NAME").to_string());

    let client = Client::with_options(client_options)?;

    ping(&client).await?;

    Ok(client)
}

/// Round trip to the cluster
#[instrument(skip_all, err(Debug))]
pub async fn ping(client: &Client) -> mongodb::error::Result<()> {
    client
        .database("admin")
        .run_command(doc! {"ping": 1})
        .await?;
    Ok(())
}

/// Case insensitive "contains" filter on `field`. The query is escaped, so
/// user input never acts as a pattern.
pub fn contains_filter(field: &str, query: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(
        field,
        doc! {
            "$regex": regex::escape(query),
            "$options": "i"
        },
    );
    filter
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_metacharacters_are_escaped() {
        let filter = contains_filter("title", "a.b*(c)");
        let inner = filter.get_document("title").unwrap();
        assert_eq!(inner.get_str("$regex").unwrap(), r"a\.b\*\(c\)");

        let filter = contains_filter("title", "درس 1");
        let inner = filter.get_document("title").unwrap();
        assert_eq!(inner.get_str("$regex").unwrap(), "درس 1");
    }

    #[test]
    fn contains_filter_is_case_insensitive() {
        let filter = contains_filter("filename", "math?");
        let inner = filter.get_document("filename").unwrap();
        assert_eq!(inner.get_str("$regex").unwrap(), r"math\?");
        assert_eq!(inner.get_str("$options").unwrap(), "i");
    }
}
