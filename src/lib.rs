// Transactions BFF - Core Library
// Exposes all modules for use in the API server, the admin CLI and tests

pub mod api;
pub mod config;
pub mod error;
pub mod import;
pub mod models;
pub mod query;
pub mod store;

// Re-export commonly used types
pub use api::{router, AppState};
pub use config::{Backend, Config};
pub use error::{ApiError, ConfigError, StoreError, StoreResult};
pub use models::{Company, NewTransaction, Transaction, TransactionPage, TransactionWithCompany};
pub use query::{Column, ListParams, Predicate, SortKey, TransactionQuery, Window};
pub use store::{DataService, SqliteStore};

#[cfg(feature = "rest")]
pub use store::RestStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber; `RUST_LOG` overrides the default `info`
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
