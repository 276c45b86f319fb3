//! MongoDB storage backend for Air3 profiles.
//!
//! Profiles live in one collection (`users` by default) keyed by the unique
//! `cognitoSub` field.
//!
//! # Example
//!
//! ```ignore
//! use air3_auth_mongo::{MongoConfig, MongoProfileStore};
//!
//! let store = MongoProfileStore::connect(&config).await?;
//! store.ensure_indexes().await?;
//! let profile = store.find_by_subject("0b5c...").await?;
//! ```
//!
//! The driver keeps a connection pool. Every operation checks a connection
//! out and returns it when the operation future completes or is dropped, so
//! no path leaks a connection.

pub mod profile;

use std::fmt;
use std::time::Duration;

use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};

pub use profile::ProfileDocument;

/// MongoDB duplicate key error code.
const DUPLICATE_KEY: i32 = 11000;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during profile storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Returns `true` if `err` is a unique index violation.
pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error))
            if write_error.code == DUPLICATE_KEY
    )
}

// =============================================================================
// Configuration
// =============================================================================

/// MongoDB connection settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MongoConfig {
    /// Connection string. May embed credentials.
    pub url: String,

    /// Database name.
    pub database: String,

    /// Profile collection name.
    pub collection: String,

    /// Maximum pooled connections.
    pub max_pool_size: Option<u32>,

    /// Connect timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Server selection timeout.
    #[serde(with = "humantime_serde")]
    pub server_selection_timeout: Duration,

    /// Application name reported to the server.
    pub app_name: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017".to_string(),
            database: "air3".to_string(),
            collection: "users".to_string(),
            max_pool_size: None,
            connect_timeout: Duration::from_secs(10),
            server_selection_timeout: Duration::from_secs(10),
            app_name: "air3-server".to_string(),
        }
    }
}

impl fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoConfig")
            .field("url", &redact_url(&self.url))
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("max_pool_size", &self.max_pool_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("server_selection_timeout", &self.server_selection_timeout)
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Hides the userinfo part of a connection string.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

impl MongoConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("mongodb://") || self.url.starts_with("mongodb+srv://")) {
            return Err("mongo.url must be a mongodb:// or mongodb+srv:// URL".into());
        }
        if self.database.trim().is_empty() {
            return Err("mongo.database must not be empty".into());
        }
        if self.collection.trim().is_empty() {
            return Err("mongo.collection must not be empty".into());
        }
        if self.max_pool_size == Some(0) {
            return Err("mongo.max_pool_size must be > 0".into());
        }
        Ok(())
    }
}

// =============================================================================
// MongoDB Profile Store
// =============================================================================

/// Profile store backed by a MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoProfileStore {
    client: Client,
    collection: Collection<ProfileDocument>,
}

impl MongoProfileStore {
    /// Create a store from an existing client.
    #[must_use]
    pub fn new(client: Client, database: &str, collection: &str) -> Self {
        let collection = client.database(database).collection(collection);
        Self { client, collection }
    }

    /// Create a store by connecting with `config`.
    ///
    /// The driver connects lazily; use [`ping`](Self::ping) to check the
    /// server is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is invalid.
    pub async fn connect(config: &MongoConfig) -> StorageResult<Self> {
        let mut options = ClientOptions::parse(&config.url).await?;
        options.app_name = Some(config.app_name.clone());
        options.connect_timeout = Some(config.connect_timeout);
        options.server_selection_timeout = Some(config.server_selection_timeout);
        if let Some(size) = config.max_pool_size {
            options.max_pool_size = Some(size);
        }

        let client = Client::with_options(options)?;
        tracing::debug!(
            database = %config.database,
            collection = %config.collection,
            "MongoDB profile store configured"
        );
        Ok(Self::new(client, &config.database, &config.collection))
    }

    /// Round-trips a `ping` command.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached.
    pub async fn ping(&self) -> StorageResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    /// Creates the unique index on `cognitoSub`.
    ///
    /// Idempotent. Fails if existing documents already violate uniqueness.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be created.
    pub async fn ensure_indexes(&self) -> StorageResult<()> {
        let index = IndexModel::builder()
            .keys(doc! { "cognitoSub": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("cognitoSub_unique".to_string())
                    .build(),
            )
            .build();

        self.collection.create_index(index).await?;
        tracing::info!(
            collection = %self.collection.name(),
            "Ensured unique index on cognitoSub"
        );
        Ok(())
    }

    pub(crate) fn collection(&self) -> &Collection<ProfileDocument> {
        &self.collection
    }
}
