//! taxon-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! category cache, and serves the JSON API over HTTP with Wikidata as the
//! upstream knowledge base.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use taxon_api::{ServerConfig, config::expand_tilde};
use taxon_gateway::WikidataGateway;
use taxon_resolver::Resolver;
use taxon_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Taxon category cache server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg = ServerConfig::load(&cli.config).context("failed to load configuration")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let gateway =
    WikidataGateway::new(server_cfg.gateway_config()).context("failed to build HTTP client")?;

  let resolver = Resolver::new(Arc::new(store), Arc::new(gateway), server_cfg.resolver_config());
  let app = taxon_api::router(Arc::new(resolver)).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!(store = %store_path.display(), "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
