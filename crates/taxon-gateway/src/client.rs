//! [`WikidataGateway`]: the reqwest-backed gateway.

use std::{collections::HashMap, time::Duration};

use reqwest::{Client, header::ACCEPT};
use taxon_core::gateway::{
  CategoryGateway, GatewayItem, LabelEntry, MAX_BATCH_SIZE, TaxonomyItem,
};

use crate::{
  GatewayError, Result,
  entities::parse_labels,
  sparql::{is_item_id, items_query, parse_items, parse_taxonomy_items, taxonomy_query},
};

/// Endpoints and HTTP settings for [`WikidataGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
  pub sparql_endpoint: String,
  pub api_endpoint:    String,
  /// Wikimedia rejects requests without a descriptive user agent.
  pub user_agent:      String,
  pub timeout:         Duration,
}

impl Default for GatewayConfig {
  fn default() -> Self {
    Self {
      sparql_endpoint: "https://query.wikidata.org/sparql".to_owned(),
      api_endpoint:    "https://www.wikidata.org/w/api.php".to_owned(),
      user_agent:      concat!("taxon/", env!("CARGO_PKG_VERSION")).to_owned(),
      timeout:         Duration::from_secs(30),
    }
  }
}

/// Async gateway to Wikidata.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct WikidataGateway {
  client: Client,
  config: GatewayConfig,
}

impl WikidataGateway {
  pub fn new(config: GatewayConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(config.timeout)
      .user_agent(config.user_agent.clone())
      .build()?;
    Ok(Self { client, config })
  }

  pub fn config(&self) -> &GatewayConfig { &self.config }

  /// `GET <sparql_endpoint>?query=…`, returning the raw JSON body.
  async fn sparql(&self, query: String) -> Result<Vec<u8>> {
    let resp = self
      .client
      .get(&self.config.sparql_endpoint)
      .header(ACCEPT, "application/sparql-results+json")
      .query(&[("query", query.as_str()), ("format", "json")])
      .send()
      .await?;
    read_body(&self.config.sparql_endpoint, resp).await
  }
}

async fn read_body(endpoint: &str, resp: reqwest::Response) -> Result<Vec<u8>> {
  let status = resp.status();
  if !status.is_success() {
    return Err(GatewayError::Status { endpoint: endpoint.to_owned(), status: status.as_u16() });
  }
  Ok(resp.bytes().await?.to_vec())
}

fn check_batch(size: usize) -> Result<()> {
  if size > MAX_BATCH_SIZE {
    return Err(GatewayError::BatchTooLarge { size, max: MAX_BATCH_SIZE });
  }
  Ok(())
}

/// Drop ids that are not item ids; they can only ever come back empty.
fn item_ids(ids: &[String]) -> Vec<String> {
  ids
    .iter()
    .filter(|id| {
      let valid = is_item_id(id);
      if !valid {
        tracing::debug!(id = %id, "skipping malformed item id");
      }
      valid
    })
    .cloned()
    .collect()
}

// ─── CategoryGateway impl ────────────────────────────────────────────────────

impl CategoryGateway for WikidataGateway {
  type Error = GatewayError;

  async fn fetch_items(
    &self,
    ids: &[String],
    language: &str,
  ) -> Result<HashMap<String, GatewayItem>> {
    check_batch(ids.len())?;
    let ids = item_ids(ids);
    if ids.is_empty() {
      return Ok(HashMap::new());
    }

    tracing::debug!(count = ids.len(), "querying items");
    let body = self.sparql(items_query(&ids, language)).await?;
    parse_items(&body)
  }

  async fn fetch_taxonomy_items(
    &self,
    names: &[String],
    language: &str,
  ) -> Result<Vec<TaxonomyItem>> {
    check_batch(names.len())?;
    if names.is_empty() {
      return Ok(Vec::new());
    }

    tracing::debug!(count = names.len(), "querying taxonomy crossref");
    let body = self.sparql(taxonomy_query(names, language)).await?;
    parse_taxonomy_items(&body)
  }

  async fn fetch_labels(
    &self,
    ids: &[String],
    languages: &[String],
  ) -> Result<HashMap<String, LabelEntry>> {
    check_batch(ids.len())?;
    let ids = item_ids(ids);
    if ids.is_empty() {
      return Ok(HashMap::new());
    }

    tracing::debug!(count = ids.len(), "fetching labels");
    let resp = self
      .client
      .get(&self.config.api_endpoint)
      .query(&[
        ("action", "wbgetentities"),
        ("format", "json"),
        ("props", "labels|descriptions"),
        ("languagefallback", "1"),
        ("redirects", "yes"),
        ("ids", ids.join("|").as_str()),
        ("languages", languages.join("|").as_str()),
      ])
      .send()
      .await?;
    let body = read_body(&self.config.api_endpoint, resp).await?;
    parse_labels(&body, languages)
  }
}
