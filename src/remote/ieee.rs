use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, instrument};

use super::{http_client, read_body, Connector, FetchError};
use crate::config::{Config, ConfigError};
use crate::model::{join_keywords, Entry, EntrySource, ResourceData};

/// Origin name of IEEE Xplore results.
pub const NAME: &str = "ieee";

const IEEE_API_BASE: &str = "https://ieeexploreapi.ieee.org/";
const SEARCH_PATH: &str = "api/v1/search/articles";

/// Largest page the metadata API serves.
pub const DEFAULT_MAX_RECORDS: u32 = 200;

/// IEEE Xplore metadata search. Pages are addressed by a 1-based `start_record`.
pub struct IeeeConnector {
    http: Client,
    base_url: Url,
    token: String,
    query: String,
    max_records: u32,
    next_start: Option<u32>,
}

impl fmt::Debug for IeeeConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IeeeConnector")
            .field("base_url", &self.base_url)
            .field("query", &self.query)
            .field("next_start", &self.next_start)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_records: Option<u64>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Article {
    doi: Option<String>,
    isbn: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    html_url: Option<String>,
    index_terms: Option<IndexTerms>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IndexTerms {
    author_terms: Option<Terms>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Terms {
    terms: Vec<String>,
}

impl IeeeConnector {
    pub fn new(token: String, query: String) -> Result<Self, FetchError> {
        let base_url = Url::parse(IEEE_API_BASE).map_err(|e| FetchError::Url {
            vendor: NAME,
            reason: e.to_string(),
        })?;
        Self::with_base_url(token, query, base_url)
    }

    pub fn with_base_url(token: String, query: String, base_url: Url) -> Result<Self, FetchError> {
        Ok(Self {
            http: http_client(NAME)?,
            base_url,
            token,
            query,
            max_records: DEFAULT_MAX_RECORDS,
            next_start: None,
        })
    }

    /// Reads `ieee.token` (required), `ieee.base_url` and `ieee.max_records`.
    pub fn from_config(cfg: &Config, query: String) -> Result<Self, FetchError> {
        let token = cfg.require_vendor_param(NAME, "token")?;
        let connector = match cfg.vendor_param(NAME, "base_url") {
            Some(base) => {
                let base_url = Url::parse(&base).map_err(|e| FetchError::Url {
                    vendor: NAME,
                    reason: e.to_string(),
                })?;
                Self::with_base_url(token, query, base_url)?
            }
            None => Self::new(token, query)?,
        };
        match cfg.vendor_param(NAME, "max_records") {
            Some(raw) => {
                let max_records = raw.parse::<u32>().ok().filter(|&n| n > 0).ok_or(
                    ConfigError::Invalid("ieee.max_records must be a positive integer"),
                )?;
                Ok(connector.with_max_records(max_records))
            }
            None => Ok(connector),
        }
    }

    pub fn with_max_records(mut self, max_records: u32) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    pub fn build_request(&self, start: u32) -> Result<reqwest::Request, FetchError> {
        let endpoint = self.base_url.join(SEARCH_PATH).map_err(|e| FetchError::Url {
            vendor: NAME,
            reason: e.to_string(),
        })?;
        self.http
            .get(endpoint)
            .header("Accept", "application/json")
            .query(&[
                ("apikey", self.token.as_str()),
                ("querytext", self.query.as_str()),
                ("start_record", start.to_string().as_str()),
                ("max_records", self.max_records.to_string().as_str()),
            ])
            .build()
            .map_err(|source| FetchError::Transport {
                vendor: NAME,
                source,
            })
    }

    #[instrument(skip_all)]
    async fn fetch_page(&mut self) -> Result<Vec<Entry>, FetchError> {
        let Some(start) = self.next_start else {
            return Ok(Vec::new());
        };
        let request = self.build_request(start)?;
        debug!(start, max_records = self.max_records, "requesting IEEE page");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|source| FetchError::Transport {
                vendor: NAME,
                source,
            })?;
        let body = read_body(NAME, res).await?;
        let page: SearchResponse = serde_json::from_str(&body).map_err(|source| {
            FetchError::Decode {
                vendor: NAME,
                source,
            }
        })?;

        let entries: Vec<Entry> = page.articles.into_iter().map(into_entry).collect();
        self.next_start = next_start(start, entries.len(), page.total_records);
        debug!(
            received = entries.len(),
            total = ?page.total_records,
            next = ?self.next_start,
            "IEEE page decoded"
        );
        Ok(entries)
    }
}

#[async_trait]
impl Connector for IeeeConnector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn request_first(&mut self) -> Result<Vec<Entry>, FetchError> {
        self.next_start = Some(1);
        self.fetch_page().await
    }

    async fn request_next(&mut self) -> Result<Vec<Entry>, FetchError> {
        self.fetch_page().await
    }
}

fn next_start(start: u32, received: usize, total: Option<u64>) -> Option<u32> {
    if received == 0 {
        return None;
    }
    let next = start.saturating_add(u32::try_from(received).unwrap_or(u32::MAX));
    match total {
        Some(total) if u64::from(next) > total => None,
        _ => Some(next),
    }
}

fn into_entry(article: Article) -> Entry {
    let keywords = article
        .index_terms
        .and_then(|terms| terms.author_terms)
        .map(|terms| join_keywords(terms.terms.iter().map(String::as_str)))
        .unwrap_or_default();
    let resource = ResourceData::new(
        article.doi.unwrap_or_default(),
        article.isbn.unwrap_or_default(),
        article.title.unwrap_or_default(),
        article.abstract_text.unwrap_or_default(),
        keywords,
    );
    Entry::new(
        resource,
        vec![EntrySource::with_link(NAME, article.html_url.unwrap_or_default())],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_sets_query_parameters() {
        let connector = IeeeConnector::with_base_url(
            "secret".into(),
            "(\"Document Title\":\"rust\")".into(),
            Url::parse("http://localhost:1234/").unwrap(),
        )
        .unwrap()
        .with_max_records(25);
        let req = connector.build_request(26).unwrap();
        assert_eq!(req.url().path(), "/api/v1/search/articles");
        let pairs: Vec<(String, String)> = req
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("apikey".into(), "secret".into())));
        assert!(pairs.contains(&("querytext".into(), "(\"Document Title\":\"rust\")".into())));
        assert!(pairs.contains(&("start_record".into(), "26".into())));
        assert!(pairs.contains(&("max_records".into(), "25".into())));
    }

    #[test]
    fn max_records_read_from_config() {
        let mut cfg = Config::default();
        cfg.apply_override("ieee.token=abc").unwrap();
        cfg.apply_override("ieee.max_records=50").unwrap();
        let connector = IeeeConnector::from_config(&cfg, "q".into()).unwrap();
        assert_eq!(connector.max_records, 50);

        cfg.apply_override("ieee.max_records=zero").unwrap();
        let err = IeeeConnector::from_config(&cfg, "q".into()).unwrap_err();
        assert!(matches!(err, FetchError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn next_start_stops_past_total() {
        assert_eq!(next_start(1, 25, Some(60)), Some(26));
        assert_eq!(next_start(51, 10, Some(60)), None);
        assert_eq!(next_start(51, 10, None), Some(61));
        assert_eq!(next_start(1, 0, Some(60)), None);
    }

    #[test]
    fn article_maps_to_entry() {
        let article: Article = serde_json::from_value(serde_json::json!({
            "doi": "10.1109/X.1",
            "title": "Rust in practice",
            "abstract": "We study.",
            "html_url": "https://ieeexplore.ieee.org/document/1",
            "index_terms": {"author_terms": {"terms": ["rust", "memory safety"]}}
        }))
        .unwrap();
        let entry = into_entry(article);
        assert_eq!(entry.resource.doi, "10.1109/X.1");
        assert_eq!(entry.resource.isbn, "");
        assert_eq!(entry.resource.keywords, "rust | memory safety");
        assert_eq!(entry.sources.len(), 1);
        assert_eq!(entry.sources[0].origin, "ieee");
        assert_eq!(
            entry.sources[0].link.as_deref(),
            Some("https://ieeexplore.ieee.org/document/1")
        );
    }
}
