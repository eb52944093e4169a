use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use slr_harvest::config::{self, Config};
use slr_harvest::db::Store;
use slr_harvest::loader::{load_query, Loader};
use slr_harvest::model::Entry;
use slr_harvest::query::{compile, Vendor};

#[derive(Debug, Parser)]
#[command(author, version, about = "Harvest and deduplicate papers for a systematic literature review")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the query in every supported search syntax
    Query {
        /// Query description file (defaults to `query_file` from the config)
        #[arg(short, long)]
        query_file: Option<PathBuf>,
    },
    /// Fetch results from remote search APIs into a local database
    Load {
        /// Database to store results in (defaults to the configured one)
        #[arg(short, long)]
        database: Option<String>,

        /// Remote vendor to query; repeat for several
        #[arg(short, long = "remote", required = true)]
        remote: Vec<String>,

        /// Query description file (defaults to `query_file` from the config)
        #[arg(short, long)]
        query_file: Option<PathBuf>,

        /// Vendor parameter override as VENDOR.KEY=VALUE; repeatable
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
    },
    /// Print stored entries as JSON lines
    List {
        /// Database to read (defaults to the configured one)
        #[arg(short, long)]
        database: Option<String>,

        /// Review states to include; 0 means not reviewed yet
        #[arg(long = "rejected", default_values_t = vec![0i64])]
        rejected: Vec<i64>,
    },
    /// Write an example configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct ListedEntry<'a> {
    id: i64,
    #[serde(flatten)]
    entry: &'a Entry,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    match args.command {
        Command::InitConfig { force } => init_config(&args.config, force),
        Command::Query { query_file } => {
            let cfg = load_config(&args.config)?;
            print_queries(&cfg, query_file.as_deref())
        }
        Command::Load {
            database,
            remote,
            query_file,
            params,
        } => {
            let mut cfg = load_config(&args.config)?;
            for param in &params {
                cfg.apply_override(param)?;
            }
            config::validate(&cfg)?;
            let query = load_query(&cfg, query_file.as_deref())?;
            let mut store = open_store(&cfg, database).await?;
            let report = Loader::new(&cfg).load(&mut store, &query, &remote).await?;
            store.close().await.context("failed to close database")?;
            info!(
                created = report.created,
                matched = report.matched,
                links = report.links,
                "load finished"
            );
            println!("{}", serde_json::to_string(&report)?);
            Ok(())
        }
        Command::List { database, rejected } => {
            let cfg = load_config(&args.config)?;
            let mut store = open_store(&cfg, database).await?;
            for (id, entry) in store.entries(&rejected).await? {
                println!("{}", serde_json::to_string(&ListedEntry { id, entry: &entry })?);
            }
            store.close().await?;
            Ok(())
        }
    }
}

/// A missing config file is fine as long as the command gets what it needs elsewhere.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    config::load(Some(path)).with_context(|| format!("failed to load {}", path.display()))
}

async fn open_store(cfg: &Config, database: Option<String>) -> Result<Store> {
    let url = match database {
        Some(url) => url,
        None => {
            cfg.ensure_dirs()?;
            cfg.database_url()
        }
    };
    Store::open(&url)
        .await
        .with_context(|| format!("failed to open database {url}"))
}

fn print_queries(cfg: &Config, query_file: Option<&Path>) -> Result<()> {
    let query = load_query(cfg, query_file)?;
    for vendor in Vendor::ALL {
        print_title(&vendor.name().to_ascii_uppercase());
        println!("{}", compile(&query, vendor.grammar()));
    }
    Ok(())
}

fn print_title(title: &str) {
    let border = "=".repeat(title.len() + 6);
    println!("{border}");
    println!("== {title} ==");
    println!("{border}");
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }
    fs::write(path, config::example())
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "example configuration written");
    Ok(())
}
