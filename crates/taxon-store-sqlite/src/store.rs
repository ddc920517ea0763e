//! [`SqliteStore`], the SQLite implementation of [`CategoryStore`] and
//! [`InteractionTracker`].

use std::{
  collections::{HashMap, HashSet},
  path::Path,
};

use rusqlite::{OptionalExtension as _, TransactionBehavior, params};
use uuid::Uuid;

use taxon_core::{
  category::Category,
  store::{CategoryStore, InteractionTracker},
};

use crate::{
  Error, Result,
  encode::{CATEGORY_SELECT, EncodedCategory, RawCategory, encode_key, encode_uuid},
  merge::{
    MAX_CHAIN_HOPS, apply_redirect_in_tx, locate, record_view_in_tx, resolve_chain,
    select_by_canonical, select_by_local_id, select_by_taxonomy, set_bookmark_in_tx,
    upsert_in_tx,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Taxon category cache backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// The keys an interaction call locates its row by.
struct Locator {
  local_id:      Option<String>,
  canonical_id:  Option<String>,
  taxonomy_name: Option<String>,
}

impl Locator {
  fn new(category: &Category) -> Self {
    Self {
      local_id:      category.local_id.map(encode_uuid),
      canonical_id:  encode_key(category.canonical()),
      taxonomy_name: encode_key(category.taxonomy()),
    }
  }

  fn describe(&self) -> String {
    self
      .local_id
      .clone()
      .or_else(|| self.canonical_id.clone())
      .or_else(|| self.taxonomy_name.clone())
      .unwrap_or_else(|| "<no identity>".to_owned())
  }
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run one write transaction: upsert `encoded` in order, then record every
  /// redirect pair. Returns the surviving populated rows in input order.
  async fn write(
    &self,
    encoded: Vec<EncodedCategory>,
    pairs: Vec<(String, String)>,
  ) -> Result<Vec<Category>> {
    let raws: Vec<RawCategory> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut local_ids = Vec::with_capacity(encoded.len());
        for category in &encoded {
          local_ids.push(upsert_in_tx(&tx, category)?);
        }
        for (from, to) in &pairs {
          apply_redirect_in_tx(&tx, from, to)?;
        }

        // A row upserted early in the batch may have been absorbed by a
        // later merge; those are skipped.
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(local_ids.len());
        for local_id in local_ids {
          if !seen.insert(local_id.clone()) {
            continue;
          }
          if let Some(raw) = select_by_local_id(&tx, &local_id)?
            && !raw.is_stub()
          {
            rows.push(raw);
          }
        }

        tx.commit()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCategory::into_category).collect()
  }

  /// Run an interaction write against the row `locator` resolves to and
  /// return that row.
  async fn interact(
    &self,
    locator: Locator,
    apply: impl FnOnce(&rusqlite::Connection, &str) -> rusqlite::Result<()> + Send + 'static,
  ) -> Result<Category> {
    let describe = locator.describe();

    let raw: Option<RawCategory> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(local_id) = locate(
          &tx,
          locator.local_id.as_deref(),
          locator.canonical_id.as_deref(),
          locator.taxonomy_name.as_deref(),
        )?
        else {
          return Ok(None);
        };
        apply(&tx, &local_id)?;
        let row = select_by_local_id(&tx, &local_id)?;
        tx.commit()?;
        Ok(row)
      })
      .await?;

    raw
      .ok_or(Error::CategoryNotFound(describe))?
      .into_category()
  }

  /// Run a `CATEGORY_SELECT` query with a trailing clause and decode the rows.
  async fn select_many(
    &self,
    clause: &'static str,
    limit: Option<i64>,
  ) -> Result<Vec<Category>> {
    let raws: Vec<RawCategory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("{CATEGORY_SELECT} {clause}"))?;
        let rows = match limit {
          Some(n) => stmt
            .query_map(params![n], RawCategory::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          None => stmt
            .query_map([], RawCategory::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCategory::into_category).collect()
  }
}

// ─── CategoryStore impl ──────────────────────────────────────────────────────

impl CategoryStore for SqliteStore {
  type Error = Error;

  async fn upsert(&self, category: Category) -> Result<Category> {
    let describe = Locator::new(&category).describe();

    if category.is_stub() {
      let from = encode_key(category.canonical()).ok_or(taxon_core::Error::MissingIdentity)?;
      let redirects = HashMap::from([(from.clone(), category.redirect_target.unwrap_or_default())]);
      self.upsert_all(Vec::new(), redirects).await?;
      return self
        .fetch_by_ids(&[from], false)
        .await?
        .into_iter()
        .next()
        .ok_or(Error::CategoryNotFound(describe));
    }

    let encoded = EncodedCategory::new(&category)?;
    self
      .write(vec![encoded], Vec::new())
      .await?
      .into_iter()
      .next()
      .ok_or(Error::CategoryNotFound(describe))
  }

  async fn upsert_all(
    &self,
    categories: Vec<Category>,
    mut redirects: HashMap<String, String>,
  ) -> Result<Vec<Category>> {
    // Stubs handed in as categories are redirects in disguise.
    for stub in categories.iter().filter(|c| c.is_stub()) {
      if let (Some(from), Some(to)) = (stub.canonical(), stub.redirect_target.as_deref()) {
        redirects.insert(from.to_owned(), to.to_owned());
      }
    }

    let mut pairs = Vec::with_capacity(redirects.len());
    for (from, to) in &redirects {
      let (Some(from), Some(to)) = (encode_key(Some(from)), encode_key(Some(to))) else {
        return Err(taxon_core::Error::MissingIdentity.into());
      };
      if from == to {
        return Err(taxon_core::Error::SelfRedirect(from).into());
      }
      pairs.push((from, to));
    }
    pairs.sort();

    let encoded = categories
      .iter()
      .filter(|c| !c.is_stub())
      .filter(|c| c.canonical().is_none_or(|id| !redirects.contains_key(id)))
      .map(EncodedCategory::new)
      .collect::<Result<Vec<_>>>()?;

    self.write(encoded, pairs).await
  }

  async fn fetch_by_ids(&self, ids: &[String], resolve_redirections: bool) -> Result<Vec<Category>> {
    let ids: Vec<String> = ids.iter().filter_map(|id| encode_key(Some(id))).collect();

    let raws: Vec<RawCategory> = self
      .conn
      .call(move |conn| {
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(ids.len());
        for id in &ids {
          let row = if resolve_redirections {
            resolve_chain(conn, id)?
          } else {
            select_by_canonical(conn, id)?
          };
          if let Some(row) = row
            && seen.insert(row.local_id.clone())
          {
            rows.push(row);
          }
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCategory::into_category).collect()
  }

  async fn fetch_by_names(&self, names: &[String]) -> Result<Vec<Category>> {
    let names: Vec<String> = names.iter().filter_map(|n| encode_key(Some(n))).collect();

    let raws: Vec<RawCategory> = self
      .conn
      .call(move |conn| {
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(names.len());
        for name in &names {
          if let Some(row) = select_by_taxonomy(conn, name)?
            && !row.is_stub()
            && seen.insert(row.local_id.clone())
          {
            rows.push(row);
          }
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCategory::into_category).collect()
  }

  async fn redirects_from(&self, ids: &[String]) -> Result<HashMap<String, String>> {
    let ids: Vec<String> = ids.iter().filter_map(|id| encode_key(Some(id))).collect();

    let map = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT redirect_target FROM categories
           WHERE canonical_id = ?1 AND redirect_target IS NOT NULL",
        )?;
        let mut map = HashMap::new();
        for id in ids {
          let mut current = id;
          for _ in 0..MAX_CHAIN_HOPS {
            if map.contains_key(&current) {
              break;
            }
            let target: Option<String> =
              stmt.query_row(params![current], |r| r.get(0)).optional()?;
            let Some(target) = target else { break };
            map.insert(current, target.clone());
            current = target;
          }
        }
        Ok(map)
      })
      .await?;

    Ok(map)
  }

  async fn get(&self, local_id: Uuid) -> Result<Option<Category>> {
    let id_str = encode_uuid(local_id);

    let raw: Option<RawCategory> = self
      .conn
      .call(move |conn| Ok(select_by_local_id(conn, &id_str)?))
      .await?;

    raw.map(RawCategory::into_category).transpose()
  }

  async fn count(&self) -> Result<usize> {
    let n: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))?))
      .await?;
    Ok(usize::try_from(n).unwrap_or_default())
  }
}

// ─── InteractionTracker impl ─────────────────────────────────────────────────

impl InteractionTracker for SqliteStore {
  async fn record_view(&self, category: &Category) -> Result<Category> {
    self.interact(Locator::new(category), record_view_in_tx).await
  }

  async fn set_bookmark(&self, category: &Category, bookmarked: bool) -> Result<Category> {
    self
      .interact(Locator::new(category), move |conn, local_id| {
        set_bookmark_in_tx(conn, local_id, bookmarked)
      })
      .await
  }

  async fn bookmarked(&self) -> Result<Vec<Category>> {
    self
      .select_many(
        "WHERE i.is_bookmarked = 1
         ORDER BY COALESCE(c.label, c.canonical_id, c.taxonomy_name)",
        None,
      )
      .await
  }

  async fn recently_viewed(&self, limit: usize) -> Result<Vec<Category>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    self
      .select_many(
        "WHERE i.last_viewed_at IS NOT NULL
         ORDER BY i.last_viewed_at DESC
         LIMIT ?1",
        Some(limit),
      )
      .await
  }
}
