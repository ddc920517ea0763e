//! [`Resolver`]: cache lookup and final assembly of a resolution.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
};

use serde::Serialize;
use taxon_core::{
  category::{Category, Identity},
  gateway::{CategoryGateway, MAX_BATCH_SIZE},
  redirect,
  store::CategoryStore,
};

use crate::{Error, Result};

/// Recursive redirect hops allowed before a chain is treated as broken.
pub const DEFAULT_MAX_REDIRECT_HOPS: usize = 8;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ResolverConfig {
  /// Preferred languages, most preferred first. The first one is recorded as
  /// `preferred_language_at_fetch`.
  pub languages:         Vec<String>,
  /// Identifiers per gateway batch; clamped to `1..=MAX_BATCH_SIZE`.
  pub batch_size:        usize,
  pub max_redirect_hops: usize,
}

impl Default for ResolverConfig {
  fn default() -> Self {
    Self {
      languages:         vec!["en".to_owned()],
      batch_size:        MAX_BATCH_SIZE,
      max_redirect_hops: DEFAULT_MAX_REDIRECT_HOPS,
    }
  }
}

impl ResolverConfig {
  pub(crate) fn primary_language(&self) -> &str {
    self.languages.first().map(String::as_str).unwrap_or("en")
  }

  pub(crate) fn effective_batch_size(&self) -> usize { self.batch_size.clamp(1, MAX_BATCH_SIZE) }
}

// ─── Result type ─────────────────────────────────────────────────────────────

/// The answer to one [`Resolver::resolve`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolution {
  /// Requested ids first (redirect-resolved), then requested names, then a
  /// placeholder per name nothing was found for.
  pub categories: Vec<Category>,
  /// Every `from → to` hop involved in answering the request.
  pub redirects:  HashMap<String, String>,
}

impl Resolution {
  /// Where `id` ended up after following every known redirect.
  pub fn final_target<'a>(&'a self, id: &'a str) -> &'a str { redirect::follow(&self.redirects, id) }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Resolves categories cache-first, falling back to the gateway.
pub struct Resolver<S, G> {
  pub(crate) store:   Arc<S>,
  pub(crate) gateway: Arc<G>,
  pub(crate) config:  ResolverConfig,
}

impl<S, G> Resolver<S, G>
where
  S: CategoryStore,
  G: CategoryGateway,
{
  pub fn new(store: Arc<S>, gateway: Arc<G>, config: ResolverConfig) -> Self {
    Self { store, gateway, config }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &ResolverConfig { &self.config }

  /// Resolve `canonical_ids` and `taxonomy_names` into categories.
  ///
  /// With `force_refresh` unset, cached rows are used and only the remainder
  /// is fetched; a fully cached request makes no gateway calls. Any gateway or
  /// store failure fails the whole call, and nothing is written unless every
  /// fetch for the call succeeded.
  #[tracing::instrument(
    skip_all,
    fields(
      ids = canonical_ids.len(),
      names = taxonomy_names.len(),
      force_refresh = force_refresh,
    )
  )]
  pub async fn resolve(
    &self,
    canonical_ids: &[String],
    taxonomy_names: &[String],
    force_refresh: bool,
  ) -> Result<Resolution> {
    let ids = normalize(canonical_ids);
    let names = normalize(taxonomy_names);

    let (cached, mut redirects) = if force_refresh {
      (Vec::new(), HashMap::new())
    } else {
      self.cached(&ids, &names).await?
    };

    let (missing_ids, missing_names) = {
      let cached_ids: HashSet<&str> = cached.iter().filter_map(Category::canonical).collect();
      let cached_names: HashSet<&str> = cached.iter().filter_map(Category::taxonomy).collect();
      let missing_ids: Vec<String> = ids
        .iter()
        .filter(|id| !cached_ids.contains(redirect::follow(&redirects, id)))
        .cloned()
        .collect();
      let missing_names: Vec<String> = names
        .iter()
        .filter(|name| !cached_names.contains(name.as_str()))
        .cloned()
        .collect();
      (missing_ids, missing_names)
    };

    let mut pool = Vec::new();
    if missing_ids.is_empty() && missing_names.is_empty() {
      tracing::debug!(cached = cached.len(), "served entirely from cache");
    } else {
      tracing::debug!(
        cached = cached.len(),
        missing_ids = missing_ids.len(),
        missing_names = missing_names.len(),
        "fetching missing categories"
      );
      let fetched = self.fetch(&missing_ids, &missing_names).await?;

      if !fetched.categories.is_empty() || !fetched.redirects.is_empty() {
        let persisted = self
          .store
          .upsert_all(fetched.categories, fetched.redirects.clone())
          .await
          .map_err(Error::store)?;
        pool.extend(persisted);
      }
      redirects.extend(fetched.redirects);
    }
    // Freshly persisted rows go first so they shadow stale cached copies.
    pool.extend(cached);

    Ok(Resolution { categories: assemble(&ids, &names, &pool, &redirects), redirects })
  }

  /// Read every requested identifier that is already stored, plus the stub
  /// hops reachable from the requested ids.
  async fn cached(
    &self,
    ids: &[String],
    names: &[String],
  ) -> Result<(Vec<Category>, HashMap<String, String>)> {
    let mut rows = Vec::new();
    let mut redirects = HashMap::new();

    if !ids.is_empty() {
      rows.extend(self.store.fetch_by_ids(ids, true).await.map_err(Error::store)?);
      redirects = self.store.redirects_from(ids).await.map_err(Error::store)?;
    }
    if !names.is_empty() {
      rows.extend(self.store.fetch_by_names(names).await.map_err(Error::store)?);
    }

    Ok((dedupe_by_identity(rows), redirects))
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Trim, drop empties and duplicates, keep request order.
fn normalize(values: &[String]) -> Vec<String> {
  let mut seen = HashSet::new();
  values
    .iter()
    .map(|v| v.trim())
    .filter(|v| !v.is_empty() && seen.insert(v.to_string()))
    .map(str::to_owned)
    .collect()
}

fn push_unique(out: &mut Vec<Category>, seen: &mut HashSet<Identity>, category: &Category) {
  if let Some(identity) = category.identity()
    && seen.insert(identity)
  {
    out.push(category.clone());
  }
}

fn dedupe_by_identity(rows: Vec<Category>) -> Vec<Category> {
  let mut seen = HashSet::new();
  let mut out = Vec::with_capacity(rows.len());
  for row in &rows {
    push_unique(&mut out, &mut seen, row);
  }
  out
}

/// Order the final answer: ids, then names, then placeholders for names that
/// resolved to nothing.
fn assemble(
  ids: &[String],
  names: &[String],
  pool: &[Category],
  redirects: &HashMap<String, String>,
) -> Vec<Category> {
  let mut out = Vec::new();
  let mut seen = HashSet::new();

  for id in ids {
    let target = redirect::follow(redirects, id);
    if let Some(found) = pool
      .iter()
      .find(|c| !c.is_stub() && c.canonical() == Some(target))
    {
      push_unique(&mut out, &mut seen, found);
    }
  }

  let mut placeholders = Vec::new();
  for name in names {
    match pool
      .iter()
      .find(|c| !c.is_stub() && c.taxonomy() == Some(name.as_str()))
    {
      Some(found) => push_unique(&mut out, &mut seen, found),
      None => placeholders.push(Category::placeholder(name.as_str())),
    }
  }
  for placeholder in &placeholders {
    push_unique(&mut out, &mut seen, placeholder);
  }

  out
}
