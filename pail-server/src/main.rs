//! `pail`: package index server and catalog maintenance commands.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pail_catalog::{search, SearchQuery};
use pail_logging::{init_subscriber, LogSettings};
use pail_server::{backend, run_server, Backend, Config, ConfigOverrides};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "pail")]
#[command(about = "Pail - a package index backed by object storage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(long, global = true, env = "PAIL_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(Args)]
struct OverrideArgs {
    /// Address to bind
    #[arg(long, global = true, env = "PAIL_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, global = true, env = "PAIL_PORT")]
    port: Option<u16>,

    /// Externally visible base URL
    #[arg(long, global = true, env = "PAIL_PUBLIC_URL")]
    public_url: Option<String>,

    /// Storage backend
    #[arg(long, global = true, value_enum, env = "PAIL_BACKEND")]
    backend: Option<Backend>,

    /// Bucket holding artifacts and the catalog
    #[arg(long, global = true, env = "PAIL_BUCKET")]
    bucket: Option<String>,

    /// S3-compatible endpoint URL
    #[arg(long, global = true, env = "PAIL_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, global = true, env = "PAIL_REGION")]
    region: Option<String>,

    #[arg(long, global = true, env = "PAIL_ACCESS_KEY")]
    access_key: Option<String>,

    #[arg(long, global = true, env = "PAIL_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Root directory of the filesystem backend
    #[arg(long, global = true, env = "PAIL_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        ConfigOverrides {
            host: args.host,
            port: args.port,
            public_url: args.public_url,
            backend: args.backend,
            bucket: args.bucket,
            endpoint: args.endpoint,
            region: args.region,
            access_key: args.access_key,
            secret_key: args.secret_key,
            data_dir: args.data_dir,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the package index
    Serve,

    /// Print the catalog, or the files of one package
    List {
        /// Canonical package name
        package: Option<String>,
    },

    /// Remove one version of a package from the catalog
    Remove {
        package: String,
        version: String,
    },

    /// Search package names and summaries
    Search {
        /// Match package names containing TERM
        #[arg(long = "name", value_name = "TERM")]
        names: Vec<String>,

        /// Match summaries containing TERM
        #[arg(long = "summary", value_name = "TERM")]
        summaries: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_settings = LogSettings::from_env();
    if cli.debug {
        log_settings = log_settings.with_debug();
    }
    let _log_guard = init_subscriber(&log_settings).context("Failed to initialise logging")?;

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    config.apply(cli.overrides.into());

    match cli.command {
        Commands::Serve => run_server(config).await,
        Commands::List { package } => list(&config, package.as_deref()).await,
        Commands::Remove { package, version } => remove(&config, &package, &version).await,
        Commands::Search { names, summaries } => {
            let query = SearchQuery {
                name_terms: names,
                summary_terms: summaries,
                operator: String::new(),
            };
            run_search(&config, &query).await
        }
    }
}

async fn list(config: &Config, package: Option<&str>) -> Result<()> {
    let store = backend::open_catalog(config).await?;
    let catalog = store.load().await.context("Failed to load catalog")?;

    match package {
        Some(name) => {
            let records = catalog
                .get(name)
                .with_context(|| format!("Package not found: {name}"))?;
            for record in records {
                println!("{}\t{}\t{}", record.version, record.file_name, record.location);
            }
        }
        None => {
            for (name, records) in catalog.iter() {
                let latest = catalog
                    .latest(name)
                    .map(|r| r.version.as_str())
                    .unwrap_or("-");
                println!("{name}\t{latest}\t{} file(s)", records.len());
            }
        }
    }
    Ok(())
}

async fn remove(config: &Config, package: &str, version: &str) -> Result<()> {
    let store = backend::open_catalog(config).await?;
    let removed = store
        .remove(package, version)
        .await
        .with_context(|| format!("Failed to remove {package} {version}"))?;
    if removed {
        info!(package = %package, version = %version, "Removed from catalog");
        println!("Removed {package} {version}");
    } else {
        println!("{package} {version} is not in the catalog");
    }
    Ok(())
}

async fn run_search(config: &Config, query: &SearchQuery) -> Result<()> {
    let store = backend::open_catalog(config).await?;
    let catalog = store.load().await.context("Failed to load catalog")?;
    for hit in search(&catalog, query) {
        println!("{} ({})\t{}", hit.name, hit.version, hit.summary);
    }
    Ok(())
}
