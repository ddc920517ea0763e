//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`
//! suffix) so that SQL and string comparisons order them correctly. Lists are
//! stored as compact JSON arrays. UUIDs are stored as hyphenated lowercase
//! strings.

use chrono::{DateTime, SecondsFormat, Utc};
use taxon_core::category::{Category, Interaction};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// [`decode_dt`] for use inside a `rusqlite` closure, where errors must be
/// `rusqlite::Error`s.
pub fn decode_dt_column(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| {
      rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ─── Lists ───────────────────────────────────────────────────────────────────

pub fn encode_list(items: &[String]) -> Result<String> {
  Ok(serde_json::to_string(items)?)
}

pub fn decode_list(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Trim a key column; empty strings are stored as NULL.
pub fn encode_key(s: Option<&str>) -> Option<String> {
  s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

// ─── Write-side row ──────────────────────────────────────────────────────────

/// Column values for a populated `categories` row, ready to be bound.
#[derive(Debug, Clone)]
pub struct EncodedCategory {
  pub canonical_id:                Option<String>,
  pub taxonomy_name:               Option<String>,
  pub label:                       Option<String>,
  pub description:                 Option<String>,
  pub aliases:                     String,
  pub instance_of_ids:             String,
  pub latitude:                    Option<f64>,
  pub longitude:                   Option<f64>,
  pub area_sqm:                    Option<f64>,
  pub image_url:                   Option<String>,
  pub preferred_language_at_fetch: Option<String>,
  pub fetched_at:                  Option<String>,
}

impl EncodedCategory {
  /// Encode `category`, rejecting it if it has no identity.
  pub fn new(category: &Category) -> Result<Self> {
    category.require_identity()?;

    Ok(Self {
      canonical_id:                encode_key(category.canonical()),
      taxonomy_name:               encode_key(category.taxonomy()),
      label:                       category.label.clone(),
      description:                 category.description.clone(),
      aliases:                     encode_list(&category.aliases)?,
      instance_of_ids:             encode_list(&category.instance_of_ids)?,
      latitude:                    category.latitude,
      longitude:                   category.longitude,
      area_sqm:                    category.area_sqm,
      image_url:                   category.image_url.clone(),
      preferred_language_at_fetch: category.preferred_language_at_fetch.clone(),
      fetched_at:                  category.fetched_at.map(encode_dt),
    })
  }
}

// ─── Read-side rows ──────────────────────────────────────────────────────────

/// Columns selected by every category read: the row joined with its
/// interaction, if any.
pub const CATEGORY_SELECT: &str = "
  SELECT
    c.local_id, c.canonical_id, c.redirect_target, c.taxonomy_name,
    c.label, c.description, c.aliases, c.instance_of_ids,
    c.latitude, c.longitude, c.area_sqm, c.image_url,
    c.preferred_language_at_fetch, c.fetched_at,
    i.last_viewed_at, i.view_count, i.is_bookmarked
  FROM categories c
  LEFT JOIN interactions i ON i.category_id = c.local_id";

/// Raw values read directly from a `categories` row joined with
/// `interactions`.
#[derive(Debug, Clone)]
pub struct RawCategory {
  pub local_id:                    String,
  pub canonical_id:                Option<String>,
  pub redirect_target:             Option<String>,
  pub taxonomy_name:               Option<String>,
  pub label:                       Option<String>,
  pub description:                 Option<String>,
  pub aliases:                     String,
  pub instance_of_ids:             String,
  pub latitude:                    Option<f64>,
  pub longitude:                   Option<f64>,
  pub area_sqm:                    Option<f64>,
  pub image_url:                   Option<String>,
  pub preferred_language_at_fetch: Option<String>,
  pub fetched_at:                  Option<String>,
  // interactions join
  pub last_viewed_at:              Option<String>,
  pub view_count:                  Option<u32>,
  pub is_bookmarked:               Option<bool>,
}

impl RawCategory {
  /// Map a row selected with [`CATEGORY_SELECT`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      local_id:                    row.get(0)?,
      canonical_id:                row.get(1)?,
      redirect_target:             row.get(2)?,
      taxonomy_name:               row.get(3)?,
      label:                       row.get(4)?,
      description:                 row.get(5)?,
      aliases:                     row.get(6)?,
      instance_of_ids:             row.get(7)?,
      latitude:                    row.get(8)?,
      longitude:                   row.get(9)?,
      area_sqm:                    row.get(10)?,
      image_url:                   row.get(11)?,
      preferred_language_at_fetch: row.get(12)?,
      fetched_at:                  row.get(13)?,
      last_viewed_at:              row.get(14)?,
      view_count:                  row.get(15)?,
      is_bookmarked:               row.get(16)?,
    })
  }

  pub fn is_stub(&self) -> bool { self.redirect_target.is_some() }

  pub fn into_category(self) -> Result<Category> {
    // `view_count` is NOT NULL in `interactions`, so a NULL here means the
    // LEFT JOIN found no interaction row.
    let interaction = match self.view_count {
      Some(view_count) => Some(Interaction {
        last_viewed_at: self.last_viewed_at.as_deref().map(decode_dt).transpose()?,
        view_count,
        is_bookmarked: self.is_bookmarked.unwrap_or(false),
      }),
      None => None,
    };

    Ok(Category {
      local_id: Some(decode_uuid(&self.local_id)?),
      canonical_id: self.canonical_id,
      redirect_target: self.redirect_target,
      taxonomy_name: self.taxonomy_name,
      label: self.label,
      description: self.description,
      aliases: decode_list(&self.aliases)?,
      instance_of_ids: decode_list(&self.instance_of_ids)?,
      latitude: self.latitude,
      longitude: self.longitude,
      area_sqm: self.area_sqm,
      image_url: self.image_url,
      preferred_language_at_fetch: self.preferred_language_at_fetch,
      fetched_at: self.fetched_at.as_deref().map(decode_dt).transpose()?,
      interaction,
    })
  }
}

/// An `interactions` row as needed while merging inside a transaction.
#[derive(Debug, Clone)]
pub struct StoredInteraction {
  pub interaction_id: String,
  pub interaction:    Interaction,
}

impl StoredInteraction {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    let last_viewed_at: Option<String> = row.get(1)?;
    Ok(Self {
      interaction_id: row.get(0)?,
      interaction:    Interaction {
        last_viewed_at: last_viewed_at
          .as_deref()
          .map(|s| decode_dt_column(1, s))
          .transpose()?,
        view_count:     row.get(2)?,
        is_bookmarked:  row.get(3)?,
      },
    })
  }
}
