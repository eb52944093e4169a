use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument, warn};

use super::{http_client, read_body, Connector, FetchError};
use crate::config::Config;
use crate::model::{Entry, EntrySource, ResourceData};

/// Origin name of Scopus results.
pub const NAME: &str = "scopus";

const SCOPUS_API_BASE: &str = "https://api.elsevier.com/";
const SEARCH_PATH: &str = "content/search/scopus";
const RECORD_URL: &str = "https://www.scopus.com/inward/record.uri";

const FIELD_DOI: &str = "prism:doi";
const FIELD_ISBN: &str = "prism:isbn";
const FIELD_TITLE: &str = "dc:title";
const FIELD_ABSTRACT: &str = "dc:description";
const FIELD_KEYWORDS: &str = "authkeywords";
const FIELD_LINK: &str = "prism:url";

const FIELDS: [&str; 6] = [
    FIELD_DOI,
    FIELD_ISBN,
    FIELD_TITLE,
    FIELD_ABSTRACT,
    FIELD_KEYWORDS,
    FIELD_LINK,
];

static SCOPUS_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"scopus_id/(\d+)").expect("valid scopus id pattern"));

/// Scopus search API. Pagination follows the `next` link of each response.
pub struct ScopusConnector {
    http: Client,
    base_url: Url,
    token: String,
    institutional_token: Option<String>,
    partner_id: Option<String>,
    query: String,
    next_link: Option<String>,
}

impl fmt::Debug for ScopusConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopusConnector")
            .field("base_url", &self.base_url)
            .field("query", &self.query)
            .field("partner_id", &self.partner_id)
            .field("next_link", &self.next_link)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "search-results")]
    results: Option<SearchResults>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResults {
    link: Vec<Link>,
    entry: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@ref", default)]
    rel: String,
    #[serde(rename = "@href", default)]
    href: String,
}

impl ScopusConnector {
    pub fn new(token: String, query: String) -> Result<Self, FetchError> {
        let base_url = parse_url(SCOPUS_API_BASE)?;
        Self::with_base_url(token, query, base_url)
    }

    pub fn with_base_url(token: String, query: String, base_url: Url) -> Result<Self, FetchError> {
        Ok(Self {
            http: http_client(NAME)?,
            base_url,
            token,
            institutional_token: None,
            partner_id: None,
            query,
            next_link: None,
        })
    }

    /// Reads `scopus.token` (required), `institutional_token`, `partner_id`
    /// and `base_url` (all optional).
    pub fn from_config(cfg: &Config, query: String) -> Result<Self, FetchError> {
        let token = cfg.require_vendor_param(NAME, "token")?;
        let connector = match cfg.vendor_param(NAME, "base_url") {
            Some(base) => Self::with_base_url(token, query, parse_url(&base)?)?,
            None => Self::new(token, query)?,
        };
        Ok(connector
            .with_institutional_token(cfg.vendor_param(NAME, "institutional_token"))
            .with_partner_id(cfg.vendor_param(NAME, "partner_id")))
    }

    pub fn with_institutional_token(mut self, token: Option<String>) -> Self {
        self.institutional_token = token;
        self
    }

    /// With a partner id, links point at the public record page instead of the API.
    pub fn with_partner_id(mut self, partner_id: Option<String>) -> Self {
        self.partner_id = partner_id;
        self
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header("Accept", "application/json")
            .header("X-ELS-APIKey", &self.token);
        match &self.institutional_token {
            Some(inst) => builder.header("X-ELS-Insttoken", inst),
            None => builder,
        }
    }

    pub fn build_first_request(&self) -> Result<reqwest::Request, FetchError> {
        let endpoint = self.base_url.join(SEARCH_PATH).map_err(url_error)?;
        let fields = FIELDS.join(",");
        self.authorize(self.http.get(endpoint))
            .query(&[
                ("query", self.query.as_str()),
                ("field", fields.as_str()),
                ("view", "COMPLETE"),
                ("cursor", "*"),
            ])
            .build()
            .map_err(transport)
    }

    fn build_next_request(&self, link: &str) -> Result<reqwest::Request, FetchError> {
        let url = parse_url(link)?;
        self.authorize(self.http.get(url)).build().map_err(transport)
    }

    #[instrument(skip_all)]
    async fn send(&mut self, request: reqwest::Request) -> Result<Vec<Entry>, FetchError> {
        debug!(path = request.url().path(), "requesting Scopus page");
        let res = self.http.execute(request).await.map_err(transport)?;
        let body = read_body(NAME, res).await?;
        let page: SearchResponse = serde_json::from_str(&body).map_err(|source| {
            FetchError::Decode {
                vendor: NAME,
                source,
            }
        })?;
        self.parse_page(page)
    }

    fn parse_page(&mut self, page: SearchResponse) -> Result<Vec<Entry>, FetchError> {
        self.next_link = None;
        let Some(results) = page.results else {
            return Ok(Vec::new());
        };
        let Some(items) = results.entry else {
            return Ok(Vec::new());
        };
        // An empty result set comes back as a single entry carrying an error.
        if items.first().map_or(true, |item| item.get("error").is_some()) {
            if let Some(error) = items.first().and_then(|item| item.get("error")) {
                debug!(%error, "Scopus returned no results");
            }
            return Ok(Vec::new());
        }

        self.next_link = results
            .link
            .into_iter()
            .find(|link| link.rel == "next" && !link.href.is_empty())
            .map(|link| link.href);

        let entries: Vec<Entry> = items.iter().map(|item| self.to_entry(item)).collect();
        debug!(
            received = entries.len(),
            has_next = self.next_link.is_some(),
            "Scopus page decoded"
        );
        Ok(entries)
    }

    fn to_entry(&self, item: &Value) -> Entry {
        let text = |field: &str| -> String {
            match item.get(field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            }
        };
        let resource = ResourceData::new(
            text(FIELD_DOI),
            isbn(item.get(FIELD_ISBN)),
            text(FIELD_TITLE),
            text(FIELD_ABSTRACT),
            text(FIELD_KEYWORDS),
        );
        let link = self.public_link(&text(FIELD_LINK));
        Entry::new(resource, vec![EntrySource::with_link(NAME, link)])
    }

    /// `https://api.elsevier.com/content/abstract/scopus_id/85149120151` becomes
    /// `https://www.scopus.com/inward/record.uri?partnerID=<partner>&scp=85149120151`.
    fn public_link(&self, api_link: &str) -> String {
        let Some(partner) = &self.partner_id else {
            return api_link.to_string();
        };
        if api_link.is_empty() {
            return String::new();
        }
        let id = SCOPUS_ID
            .captures(api_link)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or_else(|| api_link.rsplit('/').next().unwrap_or(api_link));
        format!("{RECORD_URL}?partnerID={partner}&scp={id}")
    }
}

#[async_trait]
impl Connector for ScopusConnector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn request_first(&mut self) -> Result<Vec<Entry>, FetchError> {
        self.next_link = None;
        let request = self.build_first_request()?;
        self.send(request).await
    }

    async fn request_next(&mut self) -> Result<Vec<Entry>, FetchError> {
        let Some(link) = self.next_link.take() else {
            return Ok(Vec::new());
        };
        let request = match self.build_next_request(&link) {
            Ok(request) => request,
            Err(err) => {
                warn!(%link, "unusable next link");
                return Err(err);
            }
        };
        self.send(request).await
    }
}

/// ISBNs arrive as `[{"$": "..."}]`; plain strings are accepted as well.
fn isbn(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .first()
            .and_then(|first| first.get("$"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(url_error)
}

fn url_error(err: impl fmt::Display) -> FetchError {
    FetchError::Url {
        vendor: NAME,
        reason: err.to_string(),
    }
}

fn transport(source: reqwest::Error) -> FetchError {
    FetchError::Transport {
        vendor: NAME,
        source,
    }
}
