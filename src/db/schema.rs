//! Table layout shared with existing stores.
//!
//! `main` holds one row per paper; every origin gets its own `(id, link)`
//! table named after the origin. Names and column types are kept as-is so
//! databases written by earlier tools open unchanged.

use super::StoreError;

pub const MAIN_TABLE: &str = "main";

pub const CREATE_MAIN: &str = "CREATE TABLE IF NOT EXISTS main(id INTEGER PRIMARY KEY, doi TEXT(255), isbn TEXT(25), title TEXT(255), abstract TEXT, keywords TEXT, rejected TINYINT, later BOOL, notes TEXT)";

/// Main-table columns in select order.
pub const MAIN_COLUMNS: [&str; 9] = [
    "id", "doi", "isbn", "title", "abstract", "keywords", "rejected", "later", "notes",
];

pub const LIST_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name";

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether an existing table is an origin table (not `main`, not SQLite's own).
pub fn is_origin_table(name: &str) -> bool {
    !name.eq_ignore_ascii_case(MAIN_TABLE) && !name.to_ascii_lowercase().starts_with("sqlite_")
}

/// Map key for an origin. SQLite resolves identifiers case-insensitively, so
/// `IEEE` and `ieee` share a table.
pub fn origin_key(origin: &str) -> String {
    origin.to_ascii_lowercase()
}

/// Handle to the provenance table of one origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginTable {
    name: String,
    quoted: String,
}

impl OriginTable {
    pub fn new(origin: &str) -> Result<Self, StoreError> {
        if origin.trim().is_empty()
            || origin.chars().any(char::is_control)
            || !is_origin_table(origin)
        {
            return Err(StoreError::InvalidOrigin(origin.to_string()));
        }
        Ok(Self {
            name: origin.to_string(),
            quoted: quote_ident(origin),
        })
    }

    /// Origin name as stored in the schema.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quoted(&self) -> &str {
        &self.quoted
    }

    pub fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (id INT UNSIGNED, link TEXT)",
            self.quoted
        )
    }

    pub fn insert_sql(&self) -> String {
        format!("INSERT INTO {} (id, link) VALUES (?, ?)", self.quoted)
    }
}
