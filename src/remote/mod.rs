//! Paginated search against remote bibliographic APIs.
//!
//! Every vendor implements [`Connector`]: `request_first` starts a search,
//! `request_next` follows the vendor's own continuation (offset, cursor or
//! next link) and returns an empty page once there is nothing left. The
//! provided `request_all` drains a search on top of those two calls.

pub mod ieee;
pub mod scopus;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, ConfigError};
use crate::model::Entry;

pub use ieee::IeeeConnector;
pub use scopus::ScopusConnector;

const USER_AGENT: &str = concat!("slr-harvest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("request to {vendor} failed: {source}")]
    Transport {
        vendor: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{vendor} error {status}: {body}")]
    Status {
        vendor: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("invalid {vendor} response: {source}")]
    Decode {
        vendor: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {vendor} URL: {reason}")]
    Url { vendor: &'static str, reason: String },
}

#[async_trait]
pub trait Connector: Send {
    /// Stable origin name recorded with every entry.
    fn name(&self) -> &'static str;

    /// Start the search from the beginning.
    async fn request_first(&mut self) -> Result<Vec<Entry>, FetchError>;

    /// Next page, or an empty page once the results are exhausted.
    async fn request_next(&mut self) -> Result<Vec<Entry>, FetchError>;

    /// Every page, stopping at the first empty one.
    async fn request_all(&mut self) -> Result<Vec<Entry>, FetchError> {
        let mut entries = self.request_first().await?;
        let mut pages = usize::from(!entries.is_empty());
        if !entries.is_empty() {
            loop {
                let page = self.request_next().await?;
                if page.is_empty() {
                    break;
                }
                pages += 1;
                debug!(vendor = self.name(), page = pages, size = page.len(), "page fetched");
                entries.extend(page);
            }
        }
        info!(
            vendor = self.name(),
            pages,
            entries = entries.len(),
            "search exhausted"
        );
        Ok(entries)
    }
}

/// Builds a connector for a compiled query string.
pub type ConnectorFactory = fn(&Config, String) -> Result<Box<dyn Connector>, FetchError>;

/// Name → factory map of the supported vendors.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    factories: BTreeMap<&'static str, ConnectorFactory>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with IEEE Xplore and Scopus.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ieee::NAME, build_ieee);
        registry.register(scopus::NAME, build_scopus);
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: ConnectorFactory) {
        self.factories.insert(name, factory);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn build(
        &self,
        name: &str,
        cfg: &Config,
        query: String,
    ) -> Result<Box<dyn Connector>, FetchError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownVendor(name.to_string()))?;
        factory(cfg, query)
    }
}

fn build_ieee(cfg: &Config, query: String) -> Result<Box<dyn Connector>, FetchError> {
    let connector: Box<dyn Connector> = Box::new(IeeeConnector::from_config(cfg, query)?);
    Ok(connector)
}

fn build_scopus(cfg: &Config, query: String) -> Result<Box<dyn Connector>, FetchError> {
    let connector: Box<dyn Connector> = Box::new(ScopusConnector::from_config(cfg, query)?);
    Ok(connector)
}

fn http_client(vendor: &'static str) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .no_proxy()
        .build()
        .map_err(|source| FetchError::Transport { vendor, source })
}

/// Turn a non-success response into [`FetchError::Status`], otherwise return the body.
async fn read_body(vendor: &'static str, res: reqwest::Response) -> Result<String, FetchError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        tracing::warn!(vendor, %status, "search request rejected");
        return Err(FetchError::Status {
            vendor,
            status,
            body,
        });
    }
    res.text()
        .await
        .map_err(|source| FetchError::Transport { vendor, source })
}
