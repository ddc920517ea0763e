//! The network half of a resolution: batching, redirect chasing, and turning
//! gateway responses into categories.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use taxon_core::{
  category::Category,
  gateway::{CategoryGateway, LabelEntry},
  redirect,
  store::CategoryStore,
};

use crate::{Error, Resolver, Result};

/// What the gateway told us about one request.
pub(crate) struct Fetched {
  /// Populated categories only. Redirect sources have been replaced by the
  /// category they ultimately point at.
  pub categories: Vec<Category>,
  /// Every redirect hop observed, including intermediate ones.
  pub redirects:  HashMap<String, String>,
}

/// One gateway round: at most `batch_size` identifiers in total.
#[derive(Debug, Default, PartialEq)]
struct Batch {
  ids:   Vec<String>,
  names: Vec<String>,
}

/// Split ids then names into consecutive batches of at most `size`.
fn batches(ids: &[String], names: &[String], size: usize) -> Vec<Batch> {
  enum Identifier<'a> {
    Id(&'a String),
    Name(&'a String),
  }

  let all: Vec<Identifier<'_>> = ids
    .iter()
    .map(Identifier::Id)
    .chain(names.iter().map(Identifier::Name))
    .collect();

  all
    .chunks(size.max(1))
    .map(|chunk| {
      let mut batch = Batch::default();
      for identifier in chunk {
        match identifier {
          Identifier::Id(id) => batch.ids.push((*id).clone()),
          Identifier::Name(name) => batch.names.push((*name).clone()),
        }
      }
      batch
    })
    .collect()
}

// ─── Collection ──────────────────────────────────────────────────────────────

/// Categories built so far, unique by canonical id, in discovery order.
#[derive(Default)]
struct Collected {
  items: Vec<Category>,
  index: HashMap<String, usize>,
}

impl Collected {
  fn contains(&self, id: &str) -> bool { self.index.contains_key(id) }

  fn extend(&mut self, categories: Vec<Category>) {
    for category in categories {
      let Some(id) = category.canonical().map(str::to_owned) else {
        continue;
      };
      match self.index.get(&id) {
        // First sighting wins; a later one may only contribute the
        // taxonomy name a by-id lookup could not know.
        Some(&at) => {
          let existing = &mut self.items[at];
          if existing.taxonomy().is_none() && category.taxonomy().is_some() {
            existing.taxonomy_name = category.taxonomy_name;
          }
        }
        None => {
          self.index.insert(id, self.items.len());
          self.items.push(category);
        }
      }
    }
  }

  /// Redirect targets not fetched yet and not already asked for.
  fn pending_targets(&self, requested: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    self
      .items
      .iter()
      .filter_map(|c| c.redirect_target.as_deref())
      .filter(|to| !self.contains(to) && !requested.contains(*to))
      .filter(|to| seen.insert(to.to_string()))
      .map(str::to_owned)
      .collect()
  }

  fn redirects(&self) -> HashMap<String, String> {
    self
      .items
      .iter()
      .filter(|c| c.is_stub())
      .filter_map(|c| Some((c.canonical()?.to_owned(), c.redirect_target.clone()?)))
      .collect()
  }

  /// Swap each stub for its final target and drop stubs whose chain ends
  /// nowhere.
  fn finish(mut self) -> Result<Fetched> {
    let redirects = self.redirects();
    if let Some(id) = redirect::find_cycle(&redirects) {
      return Err(Error::RedirectCycle(id.to_owned()));
    }

    // A name found on a redirected item belongs to its final target.
    let moves: Vec<(usize, String)> = self
      .items
      .iter()
      .filter(|c| c.is_stub())
      .filter_map(|stub| {
        let target = redirect::follow(&redirects, stub.canonical()?);
        Some((*self.index.get(target)?, stub.taxonomy()?.to_owned()))
      })
      .collect();
    for (to, name) in moves {
      let target = &mut self.items[to];
      if !target.is_stub() && target.taxonomy().is_none() {
        target.taxonomy_name = Some(name);
      }
    }

    let mut seen = HashSet::new();
    let mut categories = Vec::with_capacity(self.items.len());
    for category in &self.items {
      let Some(id) = category.canonical() else {
        continue;
      };
      let resolved = if category.is_stub() {
        let target = redirect::follow(&redirects, id);
        match self.index.get(target).map(|&at| &self.items[at]) {
          Some(found) if !found.is_stub() => found,
          _ => {
            tracing::debug!(from = id, to = target, "redirect target not found");
            continue;
          }
        }
      } else {
        category
      };
      if let Some(id) = resolved.canonical()
        && seen.insert(id.to_owned())
      {
        categories.push(resolved.clone());
      }
    }

    Ok(Fetched { categories, redirects })
  }
}

// ─── Network path ────────────────────────────────────────────────────────────

impl<S, G> Resolver<S, G>
where
  S: CategoryStore,
  G: CategoryGateway,
{
  /// Fetch `ids` and `names` from the gateway, following redirects until
  /// every chain ends in a populated item or a dead end.
  pub(crate) async fn fetch(&self, ids: &[String], names: &[String]) -> Result<Fetched> {
    let batch_size = self.config.effective_batch_size();
    let max_hops = self.config.max_redirect_hops;

    let mut collected = Collected::default();
    let mut requested: HashSet<String> = HashSet::new();
    let mut level_ids = ids.to_vec();
    let mut level_names = names.to_vec();
    let mut hops = 0;

    loop {
      requested.extend(level_ids.iter().cloned());
      for batch in batches(&level_ids, &level_names, batch_size) {
        collected.extend(self.fetch_batch(&batch.ids, &batch.names).await?);
      }

      let targets = collected.pending_targets(&requested);
      let Some(first) = targets.first() else {
        break;
      };
      hops += 1;
      if hops > max_hops {
        return Err(Error::RedirectDepthExceeded { id: first.clone(), max_hops });
      }
      tracing::debug!(hops, targets = targets.len(), "following redirects");
      level_ids = targets;
      level_names = Vec::new();
    }

    collected.finish()
  }

  /// One gateway round. Item, crossref and label lookups run concurrently;
  /// the first failure aborts the round.
  async fn fetch_batch(&self, ids: &[String], names: &[String]) -> Result<Vec<Category>> {
    let language = self.config.primary_language();
    let languages = &self.config.languages;
    let gateway = &self.gateway;

    let (items, crossrefs, mut labels) = tokio::try_join!(
      async {
        if ids.is_empty() {
          Ok(HashMap::new())
        } else {
          gateway.fetch_items(ids, language).await.map_err(Error::gateway)
        }
      },
      async {
        if names.is_empty() {
          Ok(Vec::new())
        } else {
          gateway
            .fetch_taxonomy_items(names, language)
            .await
            .map_err(Error::gateway)
        }
      },
      async {
        if ids.is_empty() {
          Ok(HashMap::new())
        } else {
          gateway.fetch_labels(ids, languages).await.map_err(Error::gateway)
        }
      },
    )?;

    // Items found only through the crossref still need their labels and
    // redirect status.
    let mut extra = Vec::new();
    for crossref in &crossrefs {
      let id = &crossref.canonical_id;
      if !labels.contains_key(id) && !ids.contains(id) && !extra.contains(id) {
        extra.push(id.clone());
      }
    }
    for chunk in extra.chunks(self.config.effective_batch_size()) {
      labels.extend(
        gateway
          .fetch_labels(chunk, languages)
          .await
          .map_err(Error::gateway)?,
      );
    }

    let now = Utc::now();
    let mut out = Vec::with_capacity(ids.len() + crossrefs.len());

    for id in ids {
      let entry = labels.get(id);
      if let Some(target) = redirect_of(id, entry) {
        out.push(Category::stub(id, target));
      } else if let Some(item) = items.get(id) {
        out.push(Category::from_gateway(id, item, entry, language, now));
      }
    }

    for crossref in &crossrefs {
      let id = &crossref.canonical_id;
      let entry = labels.get(id);
      let mut category = match redirect_of(id, entry) {
        Some(target) => Category::stub(id, target),
        None => Category::from_gateway(id, &crossref.item, entry, language, now),
      };
      category.taxonomy_name = Some(crossref.taxonomy_name.clone());
      out.push(category);
    }

    Ok(out)
  }
}

fn redirect_of<'a>(id: &str, entry: Option<&'a LabelEntry>) -> Option<&'a str> {
  entry
    .and_then(|e| e.redirect_target.as_deref())
    .map(str::trim)
    .filter(|to| !to.is_empty() && *to != id)
}
