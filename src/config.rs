//! Configuration loader and validator for the harvester.
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("missing '{key}' parameter for {vendor}")]
    MissingCredential { vendor: String, key: String },
    #[error("invalid parameter '{0}', expected VENDOR.KEY=VALUE")]
    InvalidOverride(String),
    #[error("unknown vendor '{0}'")]
    UnknownVendor(String),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    /// Query description used by remote loading.
    #[serde(default)]
    pub query_file: Option<String>,
    /// Free-form parameters per vendor, e.g. `vendors.ieee.token`.
    #[serde(default)]
    pub vendors: BTreeMap<String, BTreeMap<String, Value>>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// SQLite URL or path; defaults to `<data_dir>/slr.db`.
    #[serde(default)]
    pub database: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: App {
                data_dir: "./data".into(),
                database: None,
            },
            query_file: None,
            vendors: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Database URL: `DATABASE_URL` wins, then `app.database`, then the data dir.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.configured_database_url())
    }

    fn configured_database_url(&self) -> String {
        match self.app.database.as_deref().map(str::trim) {
            Some(db) if db.starts_with("sqlite:") => db.to_string(),
            Some(db) if !db.is_empty() => format!("sqlite://{}", db),
            _ => format!(
                "sqlite://{}/slr.db",
                self.app.data_dir.trim_end_matches('/')
            ),
        }
    }

    /// A vendor parameter as a string. Blank values count as absent.
    pub fn vendor_param(&self, vendor: &str, key: &str) -> Option<String> {
        let value = self.vendors.get(vendor)?.get(key)?;
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    /// Like [`Config::vendor_param`] but missing values are a configuration error.
    pub fn require_vendor_param(&self, vendor: &str, key: &str) -> Result<String, ConfigError> {
        self.vendor_param(vendor, key)
            .ok_or_else(|| ConfigError::MissingCredential {
                vendor: vendor.to_string(),
                key: key.to_string(),
            })
    }

    /// Apply a `VENDOR.KEY=VALUE` override from the command line.
    pub fn apply_override(&mut self, param: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidOverride(param.to_string());
        let (path, value) = param.split_once('=').ok_or_else(invalid)?;
        let (vendor, key) = path.split_once('.').ok_or_else(invalid)?;
        let (vendor, key) = (vendor.trim(), key.trim());
        if vendor.is_empty() || key.is_empty() || key.contains('.') {
            return Err(invalid());
        }
        self.vendors
            .entry(vendor.to_string())
            .or_default()
            .insert(key.to_string(), Value::String(value.to_string()));
        Ok(())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if let Some(db) = &cfg.app.database {
        if db.trim().is_empty() {
            return Err(ConfigError::Invalid("app.database must be non-empty when set"));
        }
    }
    if let Some(query_file) = &cfg.query_file {
        if query_file.trim().is_empty() {
            return Err(ConfigError::Invalid("query_file must be non-empty when set"));
        }
    }
    if cfg.vendors.keys().any(|name| name.trim().is_empty()) {
        return Err(ConfigError::Invalid("vendors must not contain an empty name"));
    }
    Ok(())
}

/// Example configuration written by `slr init-config`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  database: "./data/slr.db"

query_file: "./query.yml"

vendors:
  ieee:
    token: "YOUR_IEEE_API_KEY"
    max_records: 200
  scopus:
    token: "YOUR_SCOPUS_API_KEY"
    institutional_token: ""
    partner_id: ""
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.query_file.as_deref(), Some("./query.yml"));
    }

    #[test]
    fn invalid_data_dir() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("app.data_dir")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_optional_paths() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.query_file = Some("  ".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.database = Some("".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn vendor_params_accept_scalars_and_skip_blanks() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        assert_eq!(cfg.vendor_param("ieee", "max_records").as_deref(), Some("200"));
        assert_eq!(
            cfg.vendor_param("scopus", "token").as_deref(),
            Some("YOUR_SCOPUS_API_KEY")
        );
        assert_eq!(cfg.vendor_param("scopus", "partner_id"), None);
        assert_eq!(cfg.vendor_param("acm", "token"), None);
    }

    #[test]
    fn missing_credential_names_vendor_and_key() {
        let cfg = Config::default();
        let err = cfg.require_vendor_param("ieee", "token").unwrap_err();
        assert_eq!(err.to_string(), "missing 'token' parameter for ieee");
    }

    #[test]
    fn overrides_set_vendor_params() {
        let mut cfg = Config::default();
        cfg.apply_override("scopus.partner_id=HzOxMe3b").unwrap();
        cfg.apply_override("ieee.token=a=b").unwrap();
        assert_eq!(cfg.vendor_param("scopus", "partner_id").as_deref(), Some("HzOxMe3b"));
        assert_eq!(cfg.vendor_param("ieee", "token").as_deref(), Some("a=b"));

        for bad in ["token=abc", "ieee.token", ".token=x", "ieee.=x", "ieee.a.b=x"] {
            assert!(
                matches!(cfg.apply_override(bad), Err(ConfigError::InvalidOverride(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn database_url_defaults() {
        let mut cfg = Config::default();
        assert_eq!(cfg.configured_database_url(), "sqlite://./data/slr.db");
        cfg.app.database = Some("/tmp/x.db".into());
        assert_eq!(cfg.configured_database_url(), "sqlite:///tmp/x.db");
        cfg.app.database = Some("sqlite::memory:".into());
        assert_eq!(cfg.configured_database_url(), "sqlite::memory:");
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert!(cfg.vendors.contains_key("ieee"));
    }
}
