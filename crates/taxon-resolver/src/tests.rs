use std::{collections::HashMap, sync::Arc, sync::Mutex, time::Duration};

use taxon_core::{
  category::Category,
  gateway::{CategoryGateway, GatewayItem, LabelEntry, TaxonomyItem},
  store::{CategoryStore, InteractionTracker},
};
use taxon_store_sqlite::SqliteStore;
use tokio::sync::Barrier;

use crate::{Error, Resolver, ResolverConfig};

// ─── Fake gateway ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Call {
  Items(Vec<String>),
  Taxonomy(Vec<String>),
  Labels(Vec<String>),
}

#[derive(Debug, thiserror::Error)]
#[error("gateway unavailable")]
struct Unavailable;

/// An in-memory knowledge base that records every call made against it.
#[derive(Default)]
struct FakeGateway {
  items:     HashMap<String, GatewayItem>,
  crossref:  HashMap<String, String>,
  redirects: HashMap<String, String>,
  failing:   bool,
  calls:     Mutex<Vec<Call>>,
}

impl FakeGateway {
  fn with_item(mut self, id: &str, label: &str) -> Self {
    let item = GatewayItem { label: Some(label.to_owned()), ..Default::default() };
    self.items.insert(id.to_owned(), item);
    self
  }

  fn with_named_item(mut self, id: &str, label: &str, name: &str) -> Self {
    let item = GatewayItem {
      label: Some(label.to_owned()),
      taxonomy_name: Some(name.to_owned()),
      ..Default::default()
    };
    self.items.insert(id.to_owned(), item);
    self
  }

  fn with_crossref(mut self, name: &str, id: &str) -> Self {
    self.crossref.insert(name.to_owned(), id.to_owned());
    self
  }

  fn with_redirect(mut self, from: &str, to: &str) -> Self {
    self.redirects.insert(from.to_owned(), to.to_owned());
    self
  }

  fn record(&self, call: Call) -> Result<(), Unavailable> {
    self.calls.lock().unwrap().push(call);
    if self.failing { Err(Unavailable) } else { Ok(()) }
  }

  fn calls(&self) -> Vec<Call> { self.calls.lock().unwrap().clone() }

  fn item_batches(&self) -> Vec<usize> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Items(ids) => Some(ids.len()),
        _ => None,
      })
      .collect()
  }
}

impl CategoryGateway for FakeGateway {
  type Error = Unavailable;

  async fn fetch_items(
    &self,
    ids: &[String],
    _language: &str,
  ) -> Result<HashMap<String, GatewayItem>, Unavailable> {
    self.record(Call::Items(ids.to_vec()))?;
    Ok(
      ids
        .iter()
        .filter(|id| !self.redirects.contains_key(*id))
        .filter_map(|id| Some((id.clone(), self.items.get(id)?.clone())))
        .collect(),
    )
  }

  async fn fetch_taxonomy_items(
    &self,
    names: &[String],
    _language: &str,
  ) -> Result<Vec<TaxonomyItem>, Unavailable> {
    self.record(Call::Taxonomy(names.to_vec()))?;
    Ok(
      names
        .iter()
        .filter_map(|name| {
          let id = self.crossref.get(name)?;
          Some(TaxonomyItem {
            taxonomy_name: name.clone(),
            canonical_id:  id.clone(),
            item:          self.items.get(id).cloned().unwrap_or_default(),
          })
        })
        .collect(),
    )
  }

  async fn fetch_labels(
    &self,
    ids: &[String],
    _languages: &[String],
  ) -> Result<HashMap<String, LabelEntry>, Unavailable> {
    self.record(Call::Labels(ids.to_vec()))?;
    let mut out = HashMap::new();
    for id in ids {
      if let Some(to) = self.redirects.get(id) {
        let entry = LabelEntry { redirect_target: Some(to.clone()), ..Default::default() };
        out.insert(id.clone(), entry);
      } else if let Some(item) = self.items.get(id) {
        let entry = LabelEntry { label: item.label.clone(), ..Default::default() };
        out.insert(id.clone(), entry);
      }
    }
    Ok(out)
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn resolver(
  gateway: FakeGateway,
  config: ResolverConfig,
) -> (Resolver<SqliteStore, FakeGateway>, Arc<FakeGateway>) {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let gateway = Arc::new(gateway);
  (Resolver::new(store, gateway.clone(), config), gateway)
}

fn ids(values: &[&str]) -> Vec<String> { values.iter().map(|v| v.to_string()).collect() }

// ─── Cache behaviour ─────────────────────────────────────────────────────────

#[tokio::test]
async fn miss_is_fetched_and_persisted() {
  let (resolver, gateway) =
    resolver(FakeGateway::default().with_item("Q90", "Paris"), ResolverConfig::default()).await;

  let resolution = resolver.resolve(&ids(&["Q90"]), &[], false).await.unwrap();

  assert_eq!(resolution.categories.len(), 1);
  let paris = &resolution.categories[0];
  assert_eq!(paris.canonical(), Some("Q90"));
  assert_eq!(paris.label.as_deref(), Some("Paris"));
  assert_eq!(paris.preferred_language_at_fetch.as_deref(), Some("en"));
  assert!(paris.local_id.is_some());
  assert!(paris.fetched_at.is_some());
  assert_eq!(resolver.store().count().await.unwrap(), 1);
  assert!(!gateway.calls().is_empty());
}

#[tokio::test]
async fn cached_request_makes_no_gateway_calls() {
  let (resolver, gateway) =
    resolver(FakeGateway::default().with_item("Q90", "Paris"), ResolverConfig::default()).await;

  let first = resolver.resolve(&ids(&["Q90"]), &[], false).await.unwrap();
  let calls = gateway.calls().len();
  let second = resolver.resolve(&ids(&["Q90"]), &[], false).await.unwrap();

  assert_eq!(gateway.calls().len(), calls);
  assert_eq!(first, second);
}

#[tokio::test]
async fn cached_names_make_no_gateway_calls() {
  let gateway = FakeGateway::default()
    .with_named_item("Q3", "Rivers", "Rivers")
    .with_crossref("Rivers", "Q3");
  let (resolver, gateway) = resolver(gateway, ResolverConfig::default()).await;

  let first = resolver.resolve(&[], &ids(&["Rivers"]), false).await.unwrap();
  let calls = gateway.calls().len();
  let second = resolver.resolve(&[], &ids(&["Rivers"]), false).await.unwrap();

  assert!(calls > 0);
  assert_eq!(gateway.calls().len(), calls);
  assert_eq!(first, second);
  assert_eq!(second.categories[0].canonical(), Some("Q3"));
}

#[tokio::test]
async fn cached_ids_and_names_make_no_gateway_calls() {
  let gateway = FakeGateway::default()
    .with_item("Q90", "Paris")
    .with_named_item("Q3", "Rivers", "Rivers")
    .with_crossref("Rivers", "Q3");
  let (resolver, gateway) = resolver(gateway, ResolverConfig::default()).await;

  let first = resolver
    .resolve(&ids(&["Q90"]), &ids(&["Rivers"]), false)
    .await
    .unwrap();
  let calls = gateway.calls().len();
  let second = resolver
    .resolve(&ids(&["Q90"]), &ids(&["Rivers"]), false)
    .await
    .unwrap();

  assert_eq!(gateway.calls().len(), calls);
  assert_eq!(first, second);
  assert_eq!(second.categories.len(), 2);
}

#[tokio::test]
async fn force_refresh_refetches_but_keeps_local_id() {
  let (resolver, gateway) =
    resolver(FakeGateway::default().with_item("Q90", "Paris"), ResolverConfig::default()).await;

  let first = resolver.resolve(&ids(&["Q90"]), &[], false).await.unwrap();
  let calls = gateway.calls().len();
  let second = resolver.resolve(&ids(&["Q90"]), &[], true).await.unwrap();

  assert!(gateway.calls().len() > calls);
  assert_eq!(first.categories[0].local_id, second.categories[0].local_id);
  assert_eq!(resolver.store().count().await.unwrap(), 1);
}

#[tokio::test]
async fn unknown_name_yields_unsaved_placeholder() {
  let (resolver, _) = resolver(FakeGateway::default(), ResolverConfig::default()).await;

  let resolution = resolver.resolve(&[], &ids(&["Nowhere"]), false).await.unwrap();

  assert_eq!(resolution.categories, vec![Category::placeholder("Nowhere")]);
  assert_eq!(resolver.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn blank_and_duplicate_inputs_are_ignored() {
  let (resolver, gateway) =
    resolver(FakeGateway::default().with_item("Q90", "Paris"), ResolverConfig::default()).await;

  let resolution = resolver
    .resolve(&ids(&["Q90", " Q90 ", ""]), &ids(&["  "]), false)
    .await
    .unwrap();

  assert_eq!(resolution.categories.len(), 1);
  assert_eq!(gateway.item_batches(), vec![1]);
}

#[tokio::test]
async fn empty_request_is_empty() {
  let (resolver, gateway) = resolver(FakeGateway::default(), ResolverConfig::default()).await;

  let resolution = resolver.resolve(&[], &[], false).await.unwrap();

  assert!(resolution.categories.is_empty());
  assert!(gateway.calls().is_empty());
}

// ─── Ordering and merging ────────────────────────────────────────────────────

#[tokio::test]
async fn ids_come_before_names_before_placeholders() {
  let gateway = FakeGateway::default()
    .with_item("Q1", "One")
    .with_item("Q2", "Two")
    .with_item("Q3", "Rivers")
    .with_crossref("Rivers", "Q3");
  let (resolver, _) = resolver(gateway, ResolverConfig::default()).await;

  let resolution = resolver
    .resolve(&ids(&["Q2", "Q1"]), &ids(&["Unknown", "Rivers"]), false)
    .await
    .unwrap();

  let keys: Vec<(Option<&str>, Option<&str>)> = resolution
    .categories
    .iter()
    .map(|c| (c.canonical(), c.taxonomy()))
    .collect();
  assert_eq!(keys, vec![
    (Some("Q2"), None),
    (Some("Q1"), None),
    (Some("Q3"), Some("Rivers")),
    (None, Some("Unknown")),
  ]);
}

#[tokio::test]
async fn name_and_id_for_same_item_appear_once() {
  let gateway = FakeGateway::default()
    .with_named_item("Q5", "Lakes", "Lakes")
    .with_crossref("Lakes", "Q5");
  let (resolver, _) = resolver(gateway, ResolverConfig::default()).await;

  let resolution = resolver
    .resolve(&ids(&["Q5"]), &ids(&["Lakes"]), false)
    .await
    .unwrap();

  assert_eq!(resolution.categories.len(), 1);
  assert_eq!(resolution.categories[0].taxonomy(), Some("Lakes"));
  assert_eq!(resolver.store().count().await.unwrap(), 1);
}

#[tokio::test]
async fn fetched_item_absorbs_name_only_row_and_its_bookmark() {
  let gateway = FakeGateway::default().with_named_item("Q5", "Lakes", "Lakes");
  let (resolver, _) = resolver(gateway, ResolverConfig::default()).await;
  let store = resolver.store().clone();

  let name_only = store.upsert(Category::placeholder("Lakes")).await.unwrap();
  store.set_bookmark(&name_only, true).await.unwrap();

  let resolution = resolver.resolve(&ids(&["Q5"]), &[], false).await.unwrap();

  assert_eq!(store.count().await.unwrap(), 1);
  let lakes = &resolution.categories[0];
  assert_eq!(lakes.canonical(), Some("Q5"));
  assert_eq!(lakes.local_id, name_only.local_id);
  assert!(lakes.interaction.as_ref().is_some_and(|i| i.is_bookmarked));
}

#[tokio::test]
async fn items_sharing_a_taxonomy_name_are_both_kept() {
  let gateway = FakeGateway::default()
    .with_named_item("Q1", "One", "Earth")
    .with_named_item("Q2", "Two", "Earth");
  let (resolver, gateway) = resolver(gateway, ResolverConfig::default()).await;

  let first = resolver.resolve(&ids(&["Q1", "Q2"]), &[], false).await.unwrap();

  let canonical: Vec<Option<&str>> = first.categories.iter().map(Category::canonical).collect();
  assert_eq!(canonical, vec![Some("Q1"), Some("Q2")]);
  assert_eq!(resolver.store().count().await.unwrap(), 2);

  let calls = gateway.calls().len();
  let second = resolver.resolve(&ids(&["Q1", "Q2"]), &[], false).await.unwrap();
  assert_eq!(gateway.calls().len(), calls);
  assert_eq!(second, first);
}

#[tokio::test]
async fn bookmarked_item_survives_another_item_claiming_its_name() {
  let gateway = FakeGateway::default()
    .with_named_item("Q1", "One", "Earth")
    .with_named_item("Q2", "Two", "Earth");
  let (resolver, _) = resolver(gateway, ResolverConfig::default()).await;
  let store = resolver.store().clone();

  let one = resolver.resolve(&ids(&["Q1"]), &[], false).await.unwrap();
  store.set_bookmark(&one.categories[0], true).await.unwrap();

  resolver.resolve(&ids(&["Q2"]), &[], false).await.unwrap();

  assert_eq!(store.count().await.unwrap(), 2);
  let bookmarked = store.bookmarked().await.unwrap();
  assert_eq!(bookmarked.len(), 1);
  assert_eq!(bookmarked[0].canonical(), Some("Q1"));
  assert_eq!(bookmarked[0].local_id, one.categories[0].local_id);
}

// ─── Redirects ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn redirect_is_chased_and_then_served_from_cache() {
  let gateway = FakeGateway::default()
    .with_redirect("Q1", "Q2")
    .with_item("Q2", "Merged");
  let (resolver, gateway) = resolver(gateway, ResolverConfig::default()).await;

  let first = resolver.resolve(&ids(&["Q1"]), &[], false).await.unwrap();

  assert_eq!(first.categories.len(), 1);
  assert_eq!(first.categories[0].canonical(), Some("Q2"));
  assert_eq!(first.final_target("Q1"), "Q2");
  // The stub plus its target.
  assert_eq!(resolver.store().count().await.unwrap(), 2);

  let calls = gateway.calls().len();
  let second = resolver.resolve(&ids(&["Q1"]), &[], false).await.unwrap();
  assert_eq!(gateway.calls().len(), calls);
  assert_eq!(second.categories, first.categories);
  assert_eq!(second.final_target("Q1"), "Q2");
}

#[tokio::test]
async fn redirect_chain_resolves_to_final_item() {
  let gateway = FakeGateway::default()
    .with_redirect("Q1", "Q2")
    .with_redirect("Q2", "Q3")
    .with_item("Q3", "End");
  let (resolver, _) = resolver(gateway, ResolverConfig::default()).await;

  let resolution = resolver.resolve(&ids(&["Q1"]), &[], false).await.unwrap();

  assert_eq!(resolution.categories.len(), 1);
  assert_eq!(resolution.categories[0].canonical(), Some("Q3"));
  assert_eq!(resolution.redirects.len(), 2);

  let cached = resolver.store().fetch_by_ids(&ids(&["Q1"]), true).await.unwrap();
  assert_eq!(cached[0].canonical(), Some("Q3"));
}

#[tokio::test]
async fn redirect_chain_longer_than_limit_fails() {
  let gateway = FakeGateway::default()
    .with_redirect("Q1", "Q2")
    .with_redirect("Q2", "Q3")
    .with_item("Q3", "End");
  let config = ResolverConfig { max_redirect_hops: 1, ..Default::default() };
  let (resolver, _) = resolver(gateway, config).await;

  let err = resolver.resolve(&ids(&["Q1"]), &[], false).await.unwrap_err();

  assert!(matches!(err, Error::RedirectDepthExceeded { max_hops: 1, .. }));
  assert_eq!(resolver.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn redirect_cycle_fails_without_writing() {
  let gateway = FakeGateway::default()
    .with_redirect("Q1", "Q2")
    .with_redirect("Q2", "Q1");
  let (resolver, _) = resolver(gateway, ResolverConfig::default()).await;

  let err = resolver.resolve(&ids(&["Q1"]), &[], false).await.unwrap_err();

  assert!(matches!(err, Error::RedirectCycle(_)));
  assert_eq!(resolver.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn crossref_through_redirect_lands_name_on_target() {
  let gateway = FakeGateway::default()
    .with_crossref("Old name", "Q1")
    .with_redirect("Q1", "Q2")
    .with_item("Q2", "New");
  let (resolver, _) = resolver(gateway, ResolverConfig::default()).await;

  let resolution = resolver.resolve(&[], &ids(&["Old name"]), false).await.unwrap();

  assert_eq!(resolution.categories.len(), 1);
  let found = &resolution.categories[0];
  assert_eq!(found.canonical(), Some("Q2"));
  assert_eq!(found.taxonomy(), Some("Old name"));
  assert_eq!(resolution.final_target("Q1"), "Q2");
}

// ─── Batching and failure ────────────────────────────────────────────────────

#[tokio::test]
async fn large_requests_are_batched() {
  let mut gateway = FakeGateway::default();
  let requested: Vec<String> = (0..120).map(|i| format!("Q{i}")).collect();
  for id in &requested {
    gateway = gateway.with_item(id, id);
  }
  let (resolver, gateway) = resolver(gateway, ResolverConfig::default()).await;

  let resolution = resolver.resolve(&requested, &[], false).await.unwrap();

  assert_eq!(resolution.categories.len(), 120);
  assert_eq!(gateway.item_batches(), vec![50, 50, 20]);
  assert_eq!(resolution.categories[0].canonical(), Some("Q0"));
  assert_eq!(resolution.categories[119].canonical(), Some("Q119"));
}

#[tokio::test]
async fn configured_batch_size_is_capped() {
  let mut gateway = FakeGateway::default();
  let requested: Vec<String> = (0..60).map(|i| format!("Q{i}")).collect();
  for id in &requested {
    gateway = gateway.with_item(id, id);
  }
  let config = ResolverConfig { batch_size: 500, ..Default::default() };
  let (resolver, gateway) = resolver(gateway, config).await;

  resolver.resolve(&requested, &[], false).await.unwrap();

  assert_eq!(gateway.item_batches(), vec![50, 10]);
}

#[tokio::test]
async fn gateway_failure_fails_call_and_writes_nothing() {
  let gateway = FakeGateway { failing: true, ..FakeGateway::default().with_item("Q1", "One") };
  let (resolver, _) = resolver(gateway, ResolverConfig::default()).await;

  let err = resolver.resolve(&ids(&["Q1"]), &[], false).await.unwrap_err();

  assert!(matches!(err, Error::Gateway(_)));
  assert_eq!(resolver.store().count().await.unwrap(), 0);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

/// Every read blocks until all three reads of a round have started, so a
/// round only completes when they are in flight together.
struct RendezvousGateway {
  barrier: Barrier,
}

impl CategoryGateway for RendezvousGateway {
  type Error = Unavailable;

  async fn fetch_items(
    &self,
    ids: &[String],
    _language: &str,
  ) -> Result<HashMap<String, GatewayItem>, Unavailable> {
    self.barrier.wait().await;
    let item = GatewayItem { label: Some("Earth".to_owned()), ..Default::default() };
    Ok(ids.iter().map(|id| (id.clone(), item.clone())).collect())
  }

  async fn fetch_taxonomy_items(
    &self,
    names: &[String],
    _language: &str,
  ) -> Result<Vec<TaxonomyItem>, Unavailable> {
    self.barrier.wait().await;
    Ok(
      names
        .iter()
        .map(|name| TaxonomyItem {
          taxonomy_name: name.clone(),
          canonical_id:  "Q2".to_owned(),
          item:          GatewayItem::default(),
        })
        .collect(),
    )
  }

  async fn fetch_labels(
    &self,
    ids: &[String],
    _languages: &[String],
  ) -> Result<HashMap<String, LabelEntry>, Unavailable> {
    self.barrier.wait().await;
    let entry = LabelEntry { label: Some("Earth".to_owned()), ..Default::default() };
    Ok(ids.iter().map(|id| (id.clone(), entry.clone())).collect())
  }
}

#[tokio::test]
async fn item_crossref_and_label_reads_run_concurrently() {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let gateway = Arc::new(RendezvousGateway { barrier: Barrier::new(3) });
  let resolver = Resolver::new(store, gateway, ResolverConfig::default());

  // The crossref points at a requested id, so the round needs no follow-up
  // label read.
  let resolution = tokio::time::timeout(
    Duration::from_secs(5),
    resolver.resolve(&ids(&["Q2"]), &ids(&["Earth"]), false),
  )
  .await
  .expect("gateway reads were issued one after another")
  .unwrap();

  assert_eq!(resolution.categories.len(), 1);
  assert_eq!(resolution.categories[0].canonical(), Some("Q2"));
  assert_eq!(resolution.categories[0].taxonomy(), Some("Earth"));
}
