//! The `CategoryGateway` trait and the shapes of its three batch reads.
//!
//! A gateway fronts two remote sources that do not agree with each other: a
//! structured knowledge base keyed by canonical id, and a free-text taxonomy
//! that can be cross-referenced into it.

use std::{collections::HashMap, future::Future};

use serde::{Deserialize, Serialize};

/// Largest number of identifiers any single gateway call accepts.
pub const MAX_BATCH_SIZE: usize = 50;

// ─── Response types ──────────────────────────────────────────────────────────

/// Descriptive payload for one knowledge-base item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayItem {
  pub label:           Option<String>,
  pub description:     Option<String>,
  pub aliases:         Vec<String>,
  pub latitude:        Option<f64>,
  pub longitude:       Option<f64>,
  pub area_sqm:        Option<f64>,
  pub image_url:       Option<String>,
  pub instance_of_ids: Vec<String>,
  /// The taxonomy name the knowledge base links this item to, if any.
  pub taxonomy_name:   Option<String>,
}

/// An item found through the taxonomy cross-reference, annotated with the
/// name that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyItem {
  pub taxonomy_name: String,
  pub canonical_id:  String,
  pub item:          GatewayItem,
}

/// Raw label lookup result. `redirect_target` is set when the requested id
/// has been merged into another item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
  pub label:           Option<String>,
  pub description:     Option<String>,
  pub redirect_target: Option<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Read access to the remote category sources.
///
/// Every method accepts at most [`MAX_BATCH_SIZE`] identifiers. Callers are
/// responsible for chunking.
pub trait CategoryGateway: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Look up items by canonical id. Ids the knowledge base does not know are
  /// absent from the returned map.
  fn fetch_items<'a>(
    &'a self,
    ids: &'a [String],
    language: &'a str,
  ) -> impl Future<Output = Result<HashMap<String, GatewayItem>, Self::Error>> + Send + 'a;

  /// Map taxonomy names to the items that reference them.
  fn fetch_taxonomy_items<'a>(
    &'a self,
    names: &'a [String],
    language: &'a str,
  ) -> impl Future<Output = Result<Vec<TaxonomyItem>, Self::Error>> + Send + 'a;

  /// Fetch labels, descriptions and redirect targets, trying `languages` in
  /// order.
  fn fetch_labels<'a>(
    &'a self,
    ids: &'a [String],
    languages: &'a [String],
  ) -> impl Future<Output = Result<HashMap<String, LabelEntry>, Self::Error>> + Send + 'a;
}
