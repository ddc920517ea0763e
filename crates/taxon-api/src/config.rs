//! Server configuration, loaded from an optional TOML file overlaid by
//! `TAXON_*` environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::Deserialize;
use taxon_gateway::GatewayConfig;
use taxon_resolver::{DEFAULT_MAX_REDIRECT_HOPS, ResolverConfig};

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  #[serde(default = "default_store_path")]
  pub store_path:           PathBuf,
  /// Preferred languages, most preferred first.
  #[serde(default = "default_languages")]
  pub languages:            Vec<String>,
  pub sparql_endpoint:      Option<String>,
  pub api_endpoint:         Option<String>,
  pub user_agent:           Option<String>,
  #[serde(default = "default_timeout")]
  pub request_timeout_secs: u64,
  pub batch_size:           Option<usize>,
  pub max_redirect_hops:    Option<usize>,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/taxon/taxon.db") }

fn default_languages() -> Vec<String> { vec!["en".to_owned()] }

fn default_timeout() -> u64 { 30 }

impl ServerConfig {
  /// Read `path` (if it exists) and `TAXON_*` variables. List values in the
  /// environment are comma-separated, e.g. `TAXON_LANGUAGES=fr,en`.
  pub fn load(path: &Path) -> Result<Self, ::config::ConfigError> {
    ::config::Config::builder()
      .add_source(::config::File::from(path).required(false))
      .add_source(
        ::config::Environment::with_prefix("TAXON")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("languages"),
      )
      .build()?
      .try_deserialize()
  }

  pub fn gateway_config(&self) -> GatewayConfig {
    let defaults = GatewayConfig::default();
    GatewayConfig {
      sparql_endpoint: self.sparql_endpoint.clone().unwrap_or(defaults.sparql_endpoint),
      api_endpoint:    self.api_endpoint.clone().unwrap_or(defaults.api_endpoint),
      user_agent:      self.user_agent.clone().unwrap_or(defaults.user_agent),
      timeout:         Duration::from_secs(self.request_timeout_secs),
    }
  }

  pub fn resolver_config(&self) -> ResolverConfig {
    let defaults = ResolverConfig::default();
    ResolverConfig {
      languages:         if self.languages.is_empty() {
        defaults.languages
      } else {
        self.languages.clone()
      },
      batch_size:        self.batch_size.unwrap_or(defaults.batch_size),
      max_redirect_hops: self.max_redirect_hops.unwrap_or(DEFAULT_MAX_REDIRECT_HOPS),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
