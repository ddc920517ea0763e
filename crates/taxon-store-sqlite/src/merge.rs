//! Conflict resolution for the two nullable unique keys.
//!
//! Everything here runs synchronously on the connection thread, inside a
//! transaction opened by [`crate::SqliteStore`]. A single incoming category
//! can collide with up to two existing rows (one by canonical id, another by
//! taxonomy name), so a plain `ON CONFLICT` clause is not enough: rows are
//! looked up, the case is branched on, and merges rewrite interactions before
//! deleting the absorbed row.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::encode::{CATEGORY_SELECT, EncodedCategory, RawCategory, StoredInteraction, encode_dt};

/// Upper bound on stub hops followed when reading a redirect chain.
pub const MAX_CHAIN_HOPS: usize = 16;

// ─── Lookups ─────────────────────────────────────────────────────────────────

pub fn local_id_by_canonical(conn: &Connection, canonical_id: &str) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(
      "SELECT local_id FROM categories WHERE canonical_id = ?1",
      params![canonical_id],
      |r| r.get(0),
    )
    .optional()
}

pub fn local_id_by_taxonomy(conn: &Connection, taxonomy_name: &str) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(
      "SELECT local_id FROM categories WHERE taxonomy_name = ?1",
      params![taxonomy_name],
      |r| r.get(0),
    )
    .optional()
}

pub fn select_by_local_id(conn: &Connection, local_id: &str) -> rusqlite::Result<Option<RawCategory>> {
  let mut stmt = conn.prepare_cached(&format!("{CATEGORY_SELECT} WHERE c.local_id = ?1"))?;
  stmt.query_row(params![local_id], RawCategory::from_row).optional()
}

pub fn select_by_canonical(conn: &Connection, canonical_id: &str) -> rusqlite::Result<Option<RawCategory>> {
  let mut stmt = conn.prepare_cached(&format!("{CATEGORY_SELECT} WHERE c.canonical_id = ?1"))?;
  stmt.query_row(params![canonical_id], RawCategory::from_row).optional()
}

pub fn select_by_taxonomy(conn: &Connection, taxonomy_name: &str) -> rusqlite::Result<Option<RawCategory>> {
  let mut stmt = conn.prepare_cached(&format!("{CATEGORY_SELECT} WHERE c.taxonomy_name = ?1"))?;
  stmt.query_row(params![taxonomy_name], RawCategory::from_row).optional()
}

/// Follow the stub chain starting at `canonical_id` to the first populated
/// row. `None` if the id is unknown, the chain ends at an id that is not
/// stored, or the chain loops or exceeds [`MAX_CHAIN_HOPS`].
pub fn resolve_chain(conn: &Connection, canonical_id: &str) -> rusqlite::Result<Option<RawCategory>> {
  let mut seen = HashSet::new();
  let mut current = canonical_id.to_owned();

  for _ in 0..=MAX_CHAIN_HOPS {
    if !seen.insert(current.clone()) {
      tracing::warn!(canonical_id, "redirect cycle in stored stubs");
      return Ok(None);
    }
    let Some(row) = select_by_canonical(conn, &current)? else {
      return Ok(None);
    };
    match row.redirect_target.clone() {
      Some(target) => current = target,
      None => return Ok(Some(row)),
    }
  }

  tracing::warn!(canonical_id, max_hops = MAX_CHAIN_HOPS, "stored redirect chain too long");
  Ok(None)
}

// ─── Interactions ────────────────────────────────────────────────────────────

pub fn load_interaction(conn: &Connection, local_id: &str) -> rusqlite::Result<Option<StoredInteraction>> {
  conn
    .query_row(
      "SELECT interaction_id, last_viewed_at, view_count, is_bookmarked
       FROM interactions WHERE category_id = ?1",
      params![local_id],
      StoredInteraction::from_row,
    )
    .optional()
}

/// Re-associate the interaction of `from` onto `onto`.
///
/// If `onto` has no interaction the row is simply re-pointed; otherwise the
/// two are merged with [`taxon_core::category::Interaction::merge`] into the
/// row `onto` already owns and the other is deleted.
pub fn move_interaction(conn: &Connection, from: &str, onto: &str) -> rusqlite::Result<()> {
  let Some(moving) = load_interaction(conn, from)? else {
    return Ok(());
  };

  match load_interaction(conn, onto)? {
    None => {
      conn.execute(
        "UPDATE interactions SET category_id = ?1 WHERE interaction_id = ?2",
        params![onto, moving.interaction_id],
      )?;
    }
    Some(existing) => {
      let merged = existing.interaction.merge(&moving.interaction);
      conn.execute(
        "DELETE FROM interactions WHERE interaction_id = ?1",
        params![moving.interaction_id],
      )?;
      conn.execute(
        "UPDATE interactions
         SET last_viewed_at = ?1, view_count = ?2, is_bookmarked = ?3
         WHERE interaction_id = ?4",
        params![
          merged.last_viewed_at.map(encode_dt),
          merged.view_count,
          merged.is_bookmarked,
          existing.interaction_id,
        ],
      )?;
    }
  }
  Ok(())
}

// ─── Upsert ──────────────────────────────────────────────────────────────────

fn insert_category(conn: &Connection, c: &EncodedCategory) -> rusqlite::Result<String> {
  let local_id = Uuid::new_v4().hyphenated().to_string();
  conn.execute(
    "INSERT INTO categories (
       local_id, canonical_id, redirect_target, taxonomy_name,
       label, description, aliases, instance_of_ids,
       latitude, longitude, area_sqm, image_url,
       preferred_language_at_fetch, fetched_at
     ) VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    params![
      local_id,
      c.canonical_id,
      c.taxonomy_name,
      c.label,
      c.description,
      c.aliases,
      c.instance_of_ids,
      c.latitude,
      c.longitude,
      c.area_sqm,
      c.image_url,
      c.preferred_language_at_fetch,
      c.fetched_at,
    ],
  )?;
  Ok(local_id)
}

/// Overwrite the payload of `local_id` with `c`. Keys are only replaced where
/// `c` carries one; a stub being overwritten becomes a populated row again.
fn overwrite_category(conn: &Connection, local_id: &str, c: &EncodedCategory) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE categories SET
       canonical_id                = COALESCE(?2, canonical_id),
       redirect_target             = NULL,
       taxonomy_name               = COALESCE(?3, taxonomy_name),
       label                       = ?4,
       description                 = ?5,
       aliases                     = ?6,
       instance_of_ids             = ?7,
       latitude                    = ?8,
       longitude                   = ?9,
       area_sqm                    = ?10,
       image_url                   = ?11,
       preferred_language_at_fetch = ?12,
       fetched_at                  = ?13
     WHERE local_id = ?1",
    params![
      local_id,
      c.canonical_id,
      c.taxonomy_name,
      c.label,
      c.description,
      c.aliases,
      c.instance_of_ids,
      c.latitude,
      c.longitude,
      c.area_sqm,
      c.image_url,
      c.preferred_language_at_fetch,
      c.fetched_at,
    ],
  )?;
  Ok(())
}

/// Find the row holding `taxonomy_name` that `c` may be reconciled with.
///
/// A taxonomy name can be claimed by more than one canonical item upstream.
/// When the row holding it carries a different canonical id, the name moves
/// to `c` (the most recent claim) and the old row keeps its identity and its
/// interaction.
fn name_match(conn: &Connection, c: &EncodedCategory, taxonomy_name: &str) -> rusqlite::Result<Option<String>> {
  let Some(row) = select_by_taxonomy(conn, taxonomy_name)? else {
    return Ok(None);
  };
  match (&row.canonical_id, &c.canonical_id) {
    (Some(held), Some(incoming)) if held != incoming => {
      tracing::info!(
        taxonomy_name,
        from = %held,
        to = %incoming,
        "moving shared taxonomy name to another item"
      );
      conn.execute(
        "UPDATE categories SET taxonomy_name = NULL WHERE local_id = ?1",
        params![row.local_id],
      )?;
      Ok(None)
    }
    _ => Ok(Some(row.local_id)),
  }
}

/// Apply the single-category upsert rule and return the surviving local id.
///
/// - no match: insert;
/// - one match (or both keys hit the same row): overwrite it;
/// - two distinct matches: keep the id-matched row, move the name-matched
///   row's interaction onto it, delete the name-matched row, then overwrite.
///
/// A name match only counts when that row has no canonical id or the same
/// one; a row with a different canonical id just loses the name.
pub fn upsert_in_tx(conn: &Connection, c: &EncodedCategory) -> rusqlite::Result<String> {
  let by_id = match &c.canonical_id {
    Some(id) => local_id_by_canonical(conn, id)?,
    None => None,
  };
  let by_name = match &c.taxonomy_name {
    Some(name) => name_match(conn, c, name)?,
    None => None,
  };

  match (by_id, by_name) {
    (None, None) => insert_category(conn, c),
    (Some(survivor), Some(absorbed)) if survivor != absorbed => {
      tracing::info!(
        canonical_id = c.canonical_id.as_deref(),
        taxonomy_name = c.taxonomy_name.as_deref(),
        %survivor,
        %absorbed,
        "merging categories matched by id and by name"
      );
      move_interaction(conn, &absorbed, &survivor)?;
      // The absorbed row still holds the taxonomy name; it has to go before
      // the survivor can take it over.
      conn.execute("DELETE FROM categories WHERE local_id = ?1", params![absorbed])?;
      overwrite_category(conn, &survivor, c)?;
      Ok(survivor)
    }
    (Some(existing), _) | (None, Some(existing)) => {
      overwrite_category(conn, &existing, c)?;
      Ok(existing)
    }
  }
}

// ─── Redirects ───────────────────────────────────────────────────────────────

/// Ensure exactly one stub `from → to` exists.
///
/// An existing populated `from` row is converted in place: its payload is
/// cleared, its taxonomy name moves to the `to` row when that row has none,
/// and its interaction is moved onto the `to` row. If the `to` row is not
/// stored yet the interaction stays on the stub until a later pass.
pub fn apply_redirect_in_tx(conn: &Connection, from: &str, to: &str) -> rusqlite::Result<()> {
  let target = select_by_canonical(conn, to)?;
  if target.is_none() {
    tracing::warn!(from, to, "recording redirect to a category that is not stored");
  }

  let stub_id = match select_by_canonical(conn, from)? {
    None => {
      let local_id = Uuid::new_v4().hyphenated().to_string();
      conn.execute(
        "INSERT INTO categories (local_id, canonical_id, redirect_target) VALUES (?1, ?2, ?3)",
        params![local_id, from, to],
      )?;
      tracing::info!(from, to, "recorded redirect stub");
      local_id
    }
    Some(existing) if existing.redirect_target.as_deref() == Some(to) => existing.local_id,
    Some(existing) => {
      conn.execute(
        "UPDATE categories SET
           redirect_target = ?2, taxonomy_name = NULL,
           label = NULL, description = NULL,
           aliases = '[]', instance_of_ids = '[]',
           latitude = NULL, longitude = NULL, area_sqm = NULL, image_url = NULL,
           preferred_language_at_fetch = NULL, fetched_at = NULL
         WHERE local_id = ?1",
        params![existing.local_id, to],
      )?;
      if let (Some(name), Some(target)) = (&existing.taxonomy_name, &target)
        && target.taxonomy_name.is_none()
        && local_id_by_taxonomy(conn, name)?.is_none()
      {
        conn.execute(
          "UPDATE categories SET taxonomy_name = ?2 WHERE local_id = ?1",
          params![target.local_id, name],
        )?;
      }
      tracing::info!(from, to, "converted category into redirect stub");
      existing.local_id
    }
  };

  if let Some(target) = target {
    move_interaction(conn, &stub_id, &target.local_id)?;
  }
  Ok(())
}

/// Stamp a view on `local_id`, creating its interaction if needed.
pub fn record_view_in_tx(conn: &Connection, local_id: &str) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO interactions (interaction_id, category_id, last_viewed_at, view_count, is_bookmarked)
     VALUES (?1, ?2, ?3, 1, 0)
     ON CONFLICT(category_id) DO UPDATE SET
       view_count     = view_count + 1,
       last_viewed_at = excluded.last_viewed_at",
    params![Uuid::new_v4().hyphenated().to_string(), local_id, encode_dt(Utc::now())],
  )?;
  Ok(())
}

/// Set the bookmark flag on `local_id`, creating its interaction if needed.
pub fn set_bookmark_in_tx(conn: &Connection, local_id: &str, bookmarked: bool) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO interactions (interaction_id, category_id, last_viewed_at, view_count, is_bookmarked)
     VALUES (?1, ?2, NULL, 0, ?3)
     ON CONFLICT(category_id) DO UPDATE SET is_bookmarked = excluded.is_bookmarked",
    params![Uuid::new_v4().hyphenated().to_string(), local_id, bookmarked],
  )?;
  Ok(())
}

/// Find the row an interaction should land on: the row with `local_id` if it
/// is still stored, otherwise the row the canonical id resolves to (following
/// stubs), otherwise the row holding the taxonomy name.
pub fn locate(
  conn: &Connection,
  local_id: Option<&str>,
  canonical_id: Option<&str>,
  taxonomy_name: Option<&str>,
) -> rusqlite::Result<Option<String>> {
  if let Some(id) = local_id
    && let Some(row) = select_by_local_id(conn, id)?
    && !row.is_stub()
  {
    return Ok(Some(row.local_id));
  }
  if let Some(canonical_id) = canonical_id
    && let Some(row) = resolve_chain(conn, canonical_id)?
  {
    return Ok(Some(row.local_id));
  }
  match taxonomy_name {
    Some(name) => local_id_by_taxonomy(conn, name),
    None => Ok(None),
  }
}
