//! Category: a real-world concept known by a canonical id, a taxonomy name,
//! or both.
//!
//! A category row is either *populated* (it carries a descriptive payload
//! fetched from the knowledge base) or a *stub* (it only records that its
//! canonical id has been superseded by another one).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, gateway::{GatewayItem, LabelEntry}};

// ─── Identity ────────────────────────────────────────────────────────────────

/// The value a category is deduplicated by: its canonical id if it has one,
/// its taxonomy name otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identity {
  Canonical(String),
  Taxonomy(String),
}

// ─── Interaction ─────────────────────────────────────────────────────────────

/// User-generated state attached one-to-one to a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
  pub last_viewed_at: Option<DateTime<Utc>>,
  pub view_count:     u32,
  pub is_bookmarked:  bool,
}

impl Interaction {
  /// Combine the interaction state of two rows that turned out to describe
  /// the same concept.
  ///
  /// A bookmark on either side survives and the most recent view wins. The
  /// larger of the two view counts is kept; counts are not summed.
  pub fn merge(&self, other: &Interaction) -> Interaction {
    Interaction {
      last_viewed_at: self.last_viewed_at.max(other.last_viewed_at),
      view_count:     self.view_count.max(other.view_count),
      is_bookmarked:  self.is_bookmarked || other.is_bookmarked,
    }
  }
}

// ─── Category ────────────────────────────────────────────────────────────────

/// A category as stored locally, or as freshly built from network data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
  /// Surrogate key; `None` until the category has been persisted.
  pub local_id:                    Option<Uuid>,
  pub canonical_id:                Option<String>,
  /// Set only on stubs: the canonical id that replaced `canonical_id`.
  pub redirect_target:             Option<String>,
  pub taxonomy_name:               Option<String>,
  pub label:                       Option<String>,
  pub description:                 Option<String>,
  pub aliases:                     Vec<String>,
  pub instance_of_ids:             Vec<String>,
  pub latitude:                    Option<f64>,
  pub longitude:                   Option<f64>,
  pub area_sqm:                    Option<f64>,
  pub image_url:                   Option<String>,
  pub preferred_language_at_fetch: Option<String>,
  pub fetched_at:                  Option<DateTime<Utc>>,
  /// Read model only; never written through an upsert.
  pub interaction:                 Option<Interaction>,
}

impl Category {
  /// A bare category carrying only a taxonomy name. Returned to callers as a
  /// placeholder for names nothing could be resolved for.
  pub fn placeholder(taxonomy_name: impl Into<String>) -> Self {
    Self { taxonomy_name: Some(taxonomy_name.into()), ..Default::default() }
  }

  /// A stub recording that `canonical_id` now lives at `target`.
  pub fn stub(canonical_id: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      canonical_id: Some(canonical_id.into()),
      redirect_target: Some(target.into()),
      ..Default::default()
    }
  }

  /// Build a populated category from the gateway's item and raw-label
  /// responses. The raw-label values win when present.
  pub fn from_gateway(
    canonical_id: impl Into<String>,
    item: &GatewayItem,
    labels: Option<&LabelEntry>,
    language: &str,
    fetched_at: DateTime<Utc>,
  ) -> Self {
    let label = labels
      .and_then(|l| l.label.clone())
      .or_else(|| item.label.clone());
    let description = labels
      .and_then(|l| l.description.clone())
      .or_else(|| item.description.clone());

    Self {
      local_id: None,
      canonical_id: Some(canonical_id.into()),
      redirect_target: None,
      taxonomy_name: item.taxonomy_name.clone(),
      label,
      description,
      aliases: item.aliases.clone(),
      instance_of_ids: item.instance_of_ids.clone(),
      latitude: item.latitude,
      longitude: item.longitude,
      area_sqm: item.area_sqm,
      image_url: item.image_url.clone(),
      preferred_language_at_fetch: Some(language.to_owned()),
      fetched_at: Some(fetched_at),
      interaction: None,
    }
  }

  /// The canonical id, ignoring empty strings.
  pub fn canonical(&self) -> Option<&str> { non_empty(self.canonical_id.as_deref()) }

  /// The taxonomy name, ignoring empty strings.
  pub fn taxonomy(&self) -> Option<&str> { non_empty(self.taxonomy_name.as_deref()) }

  pub fn is_stub(&self) -> bool { non_empty(self.redirect_target.as_deref()).is_some() }

  /// `canonical_id ?? taxonomy_name`, or `None` for an invalid category.
  pub fn identity(&self) -> Option<Identity> {
    self
      .canonical()
      .map(|id| Identity::Canonical(id.to_owned()))
      .or_else(|| self.taxonomy().map(|n| Identity::Taxonomy(n.to_owned())))
  }

  /// Like [`Category::identity`], but an error when neither key is present.
  /// Stores call this before every write.
  pub fn require_identity(&self) -> Result<Identity> {
    self.identity().ok_or(Error::MissingIdentity)
  }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
  s.map(str::trim).filter(|s| !s.is_empty())
}
