// Data service client: the seam between the HTTP handlers and the database.
// Two backends share this trait: a PostgREST HTTP client and a local SQLite
// store with the same schema.

pub mod sqlite;

#[cfg(feature = "rest")]
pub mod rest;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Backend, Config};
use crate::error::StoreResult;
use crate::models::{Company, TransactionPage};
use crate::query::TransactionQuery;

pub use sqlite::SqliteStore;

#[cfg(feature = "rest")]
pub use rest::RestStore;

/// Name of the server-side deduplication procedure
pub const REMOVE_DUPLICATES_PROCEDURE: &str = "remove_duplicate_transactions";

#[async_trait]
pub trait DataService: Send + Sync {
    /// Filtered, sorted window of transactions with their companies embedded,
    /// plus the match count ignoring the window
    async fn list_transactions(&self, query: &TransactionQuery) -> StoreResult<TransactionPage>;

    /// Overwrite the status of every transaction with this tax identifier.
    /// Returns the number of rows touched when the backend reports it.
    async fn update_transaction_status(&self, cnpj: &str, status: &str) -> StoreResult<Option<u64>>;

    /// Create or replace the company row keyed on `company.cnpj`
    async fn upsert_company(&self, company: &Company) -> StoreResult<()>;

    /// Run the deduplication procedure. `None` when it reports no count.
    async fn remove_duplicate_transactions(&self) -> StoreResult<Option<u64>>;
}

/// Build the backend selected by the configured data service URL
pub fn connect(config: &Config) -> Result<Arc<dyn DataService>, anyhow::Error> {
    match config.backend()? {
        Backend::Sqlite(path) => {
            let store = match path {
                None => SqliteStore::open_in_memory()?,
                Some(path) => SqliteStore::open(&path)?,
            };
            Ok(Arc::new(store))
        }
        #[cfg(feature = "rest")]
        Backend::Rest(base_url) => Ok(Arc::new(RestStore::new(&base_url, &config.data_service_key)?)),
        #[cfg(not(feature = "rest"))]
        Backend::Rest(url) => Err(crate::error::ConfigError::UnsupportedUrl { url }.into()),
    }
}
