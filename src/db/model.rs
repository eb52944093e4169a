//! View models returned by the store.
//!
//! Keep these structs focused on what callers observe. Business logic lives
//! in the store itself.

use serde::Serialize;

/// Outcome of one [`Store::insert`](super::Store::insert) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Entries that produced a new main-table row.
    pub created: usize,
    /// Entries resolved to an already stored paper.
    pub matched: usize,
    /// Provenance rows written across all origin tables.
    pub links: usize,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.created += other.created;
        self.matched += other.matched;
        self.links += other.links;
    }
}
