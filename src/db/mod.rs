//! Database module: the deduplicating paper store.
//!
//! This module is split into submodules:
//! - `schema`: table names, DDL and origin-table identifiers.
//! - `model`: view models returned by the store.
//! - `store`: the [`Store`] engine that owns the connection.
//!
//! External modules should import from `slr_harvest::db`.

pub mod model;
pub mod schema;
pub mod store;

use thiserror::Error;

pub use model::IngestReport;
pub use schema::OriginTable;
pub use store::Store;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid origin name '{0}'")]
    InvalidOrigin(String),
}
