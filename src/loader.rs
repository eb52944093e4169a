//! Remote ingest: compile the query for a vendor, drain its connector and
//! store the results.
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::{info, instrument};

use crate::config::Config;
use crate::db::{IngestReport, Store};
use crate::query::{self, compile, Query, Vendor};
use crate::remote::ConnectorRegistry;

/// Runs one query against a set of remote vendors.
pub struct Loader<'a> {
    cfg: &'a Config,
    registry: ConnectorRegistry,
}

impl<'a> Loader<'a> {
    pub fn new(cfg: &'a Config) -> Self {
        Self::with_registry(cfg, ConnectorRegistry::with_defaults())
    }

    pub fn with_registry(cfg: &'a Config, registry: ConnectorRegistry) -> Self {
        Self { cfg, registry }
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Query string for `vendor` in its own search syntax.
    pub fn compile_for(&self, query: &Query, vendor: &str) -> Result<String> {
        let vendor: Vendor = vendor.parse().map_err(|e: String| anyhow!(e))?;
        Ok(compile(query, vendor.grammar()))
    }

    /// Fetch every page from each vendor in turn and insert it into `store`.
    #[instrument(skip_all, fields(vendors = vendors.len()))]
    pub async fn load(
        &self,
        store: &mut Store,
        query: &Query,
        vendors: &[String],
    ) -> Result<IngestReport> {
        let mut total = IngestReport::default();
        for vendor in vendors {
            let compiled = self.compile_for(query, vendor)?;
            info!(vendor = %vendor, query = %compiled, "searching");
            let mut connector = self
                .registry
                .build(vendor, self.cfg, compiled)
                .with_context(|| format!("failed to set up {vendor} connector"))?;
            let entries = connector
                .request_all()
                .await
                .with_context(|| format!("failed to fetch results from {vendor}"))?;
            let report = store
                .insert(&entries)
                .await
                .with_context(|| format!("failed to store results from {vendor}"))?;
            info!(
                vendor = %vendor,
                created = report.created,
                matched = report.matched,
                links = report.links,
                "vendor loaded"
            );
            total.merge(report);
        }
        Ok(total)
    }
}

/// Query description to use: an explicit path wins over `query_file` from the config.
pub fn load_query(cfg: &Config, explicit: Option<&Path>) -> Result<Query> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => cfg
            .query_file
            .as_deref()
            .map(Into::into)
            .ok_or_else(|| anyhow!("no query file given and none configured"))?,
    };
    query::load(&path).with_context(|| format!("failed to load query from {}", path.display()))
}
