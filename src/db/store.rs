use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};
use tracing::{debug, info, instrument, warn};

use super::model::IngestReport;
use super::schema::{self, OriginTable, CREATE_MAIN, LIST_TABLES, MAIN_COLUMNS, MAIN_TABLE};
use super::StoreError;
use crate::model::{Entry, EntrySource, EntryState, ResourceData};

const BATCH_SAVEPOINT: &str = "SAVEPOINT slr_batch";
const BATCH_RELEASE: &str = "RELEASE slr_batch";
const BATCH_ROLLBACK: &str = "ROLLBACK TO slr_batch";

/// Deduplicating paper store backed by a single SQLite connection.
///
/// Writes go into a pending unit of work (an open transaction) that
/// [`Store::save`] flushes. Reads on the same store always see pending
/// writes; other connections only see them after the flush.
pub struct Store {
    conn: SqliteConnection,
    /// Origin tables keyed by [`schema::origin_key`].
    origins: BTreeMap<String, OriginTable>,
    pending: bool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("origins", &self.origins.keys().collect::<Vec<_>>())
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (creating if needed) the store at `database_url` and register
    /// every origin table already present in it.
    #[instrument(skip_all)]
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let normalized = prepare_sqlite_url(database_url);
        let mut conn = SqliteConnectOptions::from_str(&normalized)?
            .create_if_missing(true)
            .connect()
            .await?;
        // Enable WAL and stricter durability.
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&mut conn)
            .await?;
        sqlx::query("PRAGMA synchronous=FULL;")
            .execute(&mut conn)
            .await?;
        sqlx::query(CREATE_MAIN).execute(&mut conn).await?;

        let tables: Vec<String> = sqlx::query_scalar(LIST_TABLES)
            .fetch_all(&mut conn)
            .await?;
        let mut origins = BTreeMap::new();
        for name in tables.iter().filter(|n| schema::is_origin_table(n)) {
            match OriginTable::new(name) {
                Ok(table) => {
                    origins.entry(schema::origin_key(name)).or_insert(table);
                }
                Err(err) => warn!(%err, "ignoring table"),
            }
        }
        debug!(origins = origins.len(), "store opened");

        Ok(Self {
            conn,
            origins,
            pending: false,
        })
    }

    /// Known origin names, sorted.
    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.origins.values().map(OriginTable::name)
    }

    pub fn has_pending_writes(&self) -> bool {
        self.pending
    }

    /// Ingest entries, merging each one into an already stored paper when
    /// its doi, title or abstract matches (case-insensitively). Matched
    /// papers keep their stored metadata and review state; only provenance
    /// is added. Flushes when done.
    ///
    /// The batch is all or nothing: on error none of its rows or origin
    /// tables remain, and earlier pending writes are left as they were.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn insert(&mut self, entries: &[Entry]) -> Result<IngestReport, StoreError> {
        if entries.is_empty() {
            return Ok(IngestReport::default());
        }
        let started = !self.pending;
        self.begin_pending().await?;
        sqlx::query(BATCH_SAVEPOINT).execute(&mut self.conn).await?;

        let mut added = Vec::new();
        let result = self.ingest_batch(entries, &mut added).await;
        let report = match result {
            Ok(report) => report,
            Err(err) => {
                self.abandon_batch(started, &added).await;
                return Err(err);
            }
        };

        sqlx::query(BATCH_RELEASE).execute(&mut self.conn).await?;
        self.save().await?;
        info!(
            created = report.created,
            matched = report.matched,
            links = report.links,
            "ingested entries"
        );
        Ok(report)
    }

    async fn ingest_batch(
        &mut self,
        entries: &[Entry],
        added: &mut Vec<String>,
    ) -> Result<IngestReport, StoreError> {
        let mut report = IngestReport::default();
        for entry in entries {
            for source in &entry.sources {
                if let Some(key) = self.ensure_origin(&source.origin).await? {
                    added.push(key);
                }
            }

            let id = match self.find_existing(&entry.resource).await? {
                Some(id) => {
                    report.matched += 1;
                    id
                }
                None => {
                    report.created += 1;
                    self.insert_main(entry).await?
                }
            };

            for source in &entry.sources {
                let sql = self.origin_table(&source.origin)?.insert_sql();
                sqlx::query(&sql)
                    .bind(id)
                    .bind(source.link.as_deref())
                    .execute(&mut self.conn)
                    .await?;
                report.links += 1;
            }
        }
        Ok(report)
    }

    /// Undo a failed batch. Origin tables it created are forgotten as well.
    async fn abandon_batch(&mut self, started: bool, added: &[String]) {
        for key in added {
            self.origins.remove(key);
        }
        if !started {
            let undone = match sqlx::query(BATCH_ROLLBACK).execute(&mut self.conn).await {
                Ok(_) => sqlx::query(BATCH_RELEASE).execute(&mut self.conn).await,
                Err(err) => Err(err),
            };
            match undone {
                Ok(_) => {
                    warn!(discarded_origins = added.len(), "ingest batch rolled back");
                    return;
                }
                // The transaction is in an unknown state; drop all of it.
                Err(err) => warn!(%err, "savepoint rollback failed, discarding pending writes"),
            }
        }
        self.pending = false;
        if let Err(err) = sqlx::query("ROLLBACK").execute(&mut self.conn).await {
            warn!(%err, "failed to roll back ingest batch");
        }
        warn!(discarded_origins = added.len(), "ingest batch rolled back");
    }

    /// All papers whose `rejected` value is in `rejected`, ordered by id, with
    /// their provenance from every known origin.
    #[instrument(skip_all)]
    pub async fn entries(&mut self, rejected: &[i64]) -> Result<Vec<(i64, Entry)>, StoreError> {
        if rejected.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; rejected.len()].join(", ");
        let filter = format!("COALESCE({MAIN_TABLE}.rejected, 0) IN ({placeholders})");

        let columns = MAIN_COLUMNS.join(", ");
        let sql = format!("SELECT {columns} FROM {MAIN_TABLE} WHERE {filter} ORDER BY id");
        let mut query = sqlx::query(&sql);
        for value in rejected {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&mut self.conn).await?;

        let mut out = Vec::with_capacity(rows.len());
        let mut index = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get(0)?;
            index.insert(id, out.len());
            out.push((id, entry_from_row(row)?));
        }
        if out.is_empty() {
            return Ok(out);
        }

        // One query per origin keeps joins to two tables however many origins exist.
        for table in self.origins.values() {
            let q = table.quoted();
            let sql = format!(
                "SELECT {q}.id, {q}.link FROM {q} JOIN {MAIN_TABLE} ON {MAIN_TABLE}.id = {q}.id \
                 WHERE {q}.link IS NOT NULL AND {filter} ORDER BY {q}.rowid"
            );
            let mut query = sqlx::query_as::<_, (i64, String)>(&sql);
            for value in rejected {
                query = query.bind(*value);
            }
            for (id, link) in query.fetch_all(&mut self.conn).await? {
                let Some(&slot) = index.get(&id) else {
                    continue;
                };
                let source = EntrySource::new(table.name(), Some(link));
                let sources = &mut out[slot].1.sources;
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
        }
        Ok(out)
    }

    pub async fn update_rejected(
        &mut self,
        id: i64,
        reason: i64,
        save_now: bool,
    ) -> Result<(), StoreError> {
        self.begin_pending().await?;
        let res = sqlx::query("UPDATE main SET rejected = ? WHERE id = ?")
            .bind(reason)
            .bind(id)
            .execute(&mut self.conn)
            .await?;
        self.finish_update(id, res.rows_affected(), save_now).await
    }

    pub async fn update_save_for_later(
        &mut self,
        id: i64,
        save_for_later: bool,
        save_now: bool,
    ) -> Result<(), StoreError> {
        self.begin_pending().await?;
        let res = sqlx::query("UPDATE main SET later = ? WHERE id = ?")
            .bind(save_for_later)
            .bind(id)
            .execute(&mut self.conn)
            .await?;
        self.finish_update(id, res.rows_affected(), save_now).await
    }

    pub async fn update_notes(
        &mut self,
        id: i64,
        notes: &str,
        save_now: bool,
    ) -> Result<(), StoreError> {
        self.begin_pending().await?;
        let res = sqlx::query("UPDATE main SET notes = ? WHERE id = ?")
            .bind(notes)
            .bind(id)
            .execute(&mut self.conn)
            .await?;
        self.finish_update(id, res.rows_affected(), save_now).await
    }

    /// Make every write so far durable. No-op when nothing is pending.
    pub async fn save(&mut self) -> Result<(), StoreError> {
        if !self.pending {
            return Ok(());
        }
        sqlx::query("COMMIT").execute(&mut self.conn).await?;
        self.pending = false;
        Ok(())
    }

    /// Flush pending writes and close the connection.
    pub async fn close(mut self) -> Result<(), StoreError> {
        self.save().await?;
        self.conn.close().await?;
        Ok(())
    }

    async fn begin_pending(&mut self) -> Result<(), StoreError> {
        if !self.pending {
            sqlx::query("BEGIN").execute(&mut self.conn).await?;
            self.pending = true;
        }
        Ok(())
    }

    async fn finish_update(
        &mut self,
        id: i64,
        rows_affected: u64,
        save_now: bool,
    ) -> Result<(), StoreError> {
        if rows_affected == 0 {
            warn!(id, "update matched no entry");
        }
        if save_now {
            self.save().await?;
        }
        Ok(())
    }

    /// Creates the origin table when unknown; returns the new map key.
    async fn ensure_origin(&mut self, origin: &str) -> Result<Option<String>, StoreError> {
        let key = schema::origin_key(origin);
        if self.origins.contains_key(&key) {
            return Ok(None);
        }
        let table = OriginTable::new(origin)?;
        sqlx::query(&table.create_sql())
            .execute(&mut self.conn)
            .await?;
        debug!(origin, "created origin table");
        self.origins.insert(key.clone(), table);
        Ok(Some(key))
    }

    fn origin_table(&self, origin: &str) -> Result<&OriginTable, StoreError> {
        self.origins
            .get(&schema::origin_key(origin))
            .ok_or_else(|| StoreError::InvalidOrigin(origin.to_string()))
    }

    /// First stored paper (lowest id) sharing a non-blank doi, title or
    /// abstract with `resource`.
    async fn find_existing(&mut self, resource: &ResourceData) -> Result<Option<i64>, StoreError> {
        let fields = resource.identity_fields();
        if fields.is_empty() {
            return Ok(None);
        }
        let predicate = fields
            .iter()
            .map(|(column, _)| format!("{} = ? COLLATE NOCASE", column))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!("SELECT id FROM {MAIN_TABLE} WHERE {predicate} ORDER BY id LIMIT 1");

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for (_, value) in &fields {
            query = query.bind(*value);
        }
        Ok(query.fetch_optional(&mut self.conn).await?)
    }

    async fn insert_main(&mut self, entry: &Entry) -> Result<i64, StoreError> {
        let resource = &entry.resource;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO main (doi, isbn, title, abstract, keywords, rejected, later, notes) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&resource.doi)
        .bind(&resource.isbn)
        .bind(&resource.title)
        .bind(&resource.abstract_text)
        .bind(&resource.keywords)
        .bind(entry.state.rejected)
        .bind(entry.state.save_for_later)
        .bind(&entry.state.notes)
        .fetch_one(&mut self.conn)
        .await?;
        Ok(id)
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<Entry, StoreError> {
    let text = |index: usize| -> Result<String, StoreError> {
        Ok(row.try_get::<Option<String>, _>(index)?.unwrap_or_default())
    };
    Ok(Entry {
        resource: ResourceData {
            doi: text(1)?,
            isbn: text(2)?,
            title: text(3)?,
            abstract_text: text(4)?,
            keywords: text(5)?,
        },
        sources: Vec::new(),
        state: EntryState {
            rejected: row.try_get::<Option<i64>, _>(6)?.unwrap_or(0),
            save_for_later: row.try_get::<Option<bool>, _>(7)?.unwrap_or(false),
            notes: text(8)?,
        },
    })
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Bare paths are treated as files
    if !url.starts_with("sqlite:") {
        return prepare_sqlite_url(&format!("sqlite://{}", url));
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    // Strip prefix and optional //
    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    // Separate query string if any
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        // nothing to normalize
        return url.to_string();
    }

    // Expand leading ~/ to HOME
    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    // Ensure parent directory exists if any
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Rebuild URL, prefer sqlite:// form
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_pass_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn bare_paths_become_urls_and_get_parent_dirs() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested/slr.db");
        let url = prepare_sqlite_url(path.to_str().unwrap());
        assert_eq!(url, format!("sqlite://{}", path.display()));
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn query_string_is_kept() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("slr.db");
        let url = prepare_sqlite_url(&format!("sqlite://{}?mode=rwc", path.display()));
        assert!(url.ends_with("slr.db?mode=rwc"));
    }

    #[tokio::test]
    async fn empty_insert_is_a_noop() {
        let mut store = Store::open("sqlite::memory:").await.unwrap();
        let report = store.insert(&[]).await.unwrap();
        assert_eq!(report, IngestReport::default());
        assert!(!store.has_pending_writes());
    }

    #[tokio::test]
    async fn empty_filter_returns_nothing() {
        let mut store = Store::open("sqlite::memory:").await.unwrap();
        store
            .insert(&[Entry::new(
                ResourceData::new("10.1/a", "", "A", "", ""),
                vec![EntrySource::with_link("ieee", "http://a")],
            )])
            .await
            .unwrap();
        assert!(store.entries(&[]).await.unwrap().is_empty());
        assert_eq!(store.entries(&[0]).await.unwrap().len(), 1);
    }
}
