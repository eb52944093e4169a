//! Systematic literature review harvesting: one source-neutral boolean query
//! compiled for several search engines, paginated remote retrieval, and a
//! deduplicating SQLite store that remembers where each paper came from.

pub mod config;
pub mod db;
pub mod loader;
pub mod model;
pub mod query;
pub mod remote;

pub use config::{Config, ConfigError};
pub use db::{IngestReport, Store, StoreError};
pub use model::{Entry, EntrySource, EntryState, ResourceData};
pub use query::{Query, QueryError};
pub use remote::{Connector, ConnectorRegistry, FetchError};
