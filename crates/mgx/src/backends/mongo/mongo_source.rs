//! 🍃 MongoSource: a MongoDB database, seen as a list of names and a cursor per name.
//!
//! COLD OPEN. INT. REPLICA SET, 2:13 AM
//!
//! The primary had been up for 412 days. Nobody remembered the password. It was in the
//! config file the whole time, next to the hostname, right where `MongoSourceConfig` said.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongodb::{Client, Cursor, Database};
use serde::Deserialize;
use tracing::{debug, info};

use crate::backends::{DocumentCursor, DocumentSource};

/// 🔧 Where the database lives and who we are to it.
///
/// `uri`, when set, wins over `hostname`/`port`/`username`/`password`. It is the escape hatch for
/// replica sets, TLS, SRV records, and every other option a URI can carry.
#[derive(Debug, Deserialize, Clone)]
pub struct MongoSourceConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub database: String,
    #[serde(default)]
    pub uri: Option<String>,
}

fn default_hostname() -> String {
    "localhost".to_string()
}

// -- 🍃 27017: the port every MongoDB has answered on since the dawn of time
fn default_port() -> u16 {
    27017
}

impl MongoSourceConfig {
    async fn client_options(&self) -> Result<ClientOptions> {
        if let Some(uri) = &self.uri {
            return ClientOptions::parse(uri)
                .await
                .context("💀 MongoDB connection URI did not parse");
        }

        let mut options = ClientOptions::default();
        options.hosts = vec![ServerAddress::Tcp {
            host: self.hostname.clone(),
            port: Some(self.port),
        }];
        options.app_name = Some("mgx".to_string());
        if let Some(username) = &self.username {
            // -- 🔐 users are created inside the database they back up, so it is also the auth source
            let mut credential = Credential::default();
            credential.username = Some(username.clone());
            credential.password = self.password.clone();
            credential.source = Some(self.database.clone());
            options.credential = Some(credential);
        }
        Ok(options)
    }
}

/// 🍃 One database, connected and pinged.
#[derive(Debug)]
pub(crate) struct MongoSource {
    database: Database,
}

impl MongoSource {
    /// 🚀 Connect, and prove the server is really there with a `ping`.
    pub(crate) async fn new(config: MongoSourceConfig) -> Result<Self> {
        let options = config.client_options().await?;
        let client = Client::with_options(options).context("💀 MongoDB client options rejected")?;
        let database = client.database(&config.database);

        database.run_command(doc! { "ping": 1 }).await.with_context(|| {
            format!(
                "💀 MongoDB at {}:{} did not answer a ping for database '{}'. \
                 Check: hostname, port, credentials, and whether mongod is awake.",
                config.hostname, config.port, config.database
            )
        })?;
        info!("🍃 connected to MongoDB database '{}'", config.database);

        Ok(Self { database })
    }

    pub(crate) fn database_name(&self) -> &str {
        self.database.name()
    }
}

/// 📜 A server-side cursor over one collection.
#[derive(Debug)]
pub(crate) struct MongoCursor {
    cursor: Cursor<Document>,
}

#[async_trait]
impl DocumentCursor for MongoCursor {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        self.cursor
            .try_next()
            .await
            .context("💀 MongoDB cursor failed while fetching the next batch")
    }
}

#[async_trait]
impl DocumentSource for MongoSource {
    type Cursor = MongoCursor;

    async fn list_collection_names(&mut self) -> Result<Vec<String>> {
        let mut names = self
            .database
            .list_collection_names()
            .await
            .with_context(|| format!("💀 could not list collections of '{}'", self.database.name()))?;
        // -- server order is unspecified; sorted names make reruns and resumes line up
        names.sort();
        Ok(names)
    }

    async fn open_cursor(&mut self, collection: &str, skip: u64) -> Result<MongoCursor> {
        debug!("🍃 find() over '{collection}' skipping {skip}");
        let cursor = self
            .database
            .collection::<Document>(collection)
            .find(doc! {})
            .sort(doc! { "_id": 1 })
            .skip(skip)
            .await
            .with_context(|| format!("💀 could not open a cursor over '{collection}'"))?;
        Ok(MongoCursor { cursor })
    }
}
